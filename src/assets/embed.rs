use rust_embed::Embed;

/// Public site pages and their assets
#[derive(Embed)]
#[folder = "site/public/"]
pub struct PublicAssets;

/// Login page template
#[derive(Embed)]
#[folder = "site/login/"]
pub struct LoginAssets;

/// Admin pages, including the editor
#[derive(Embed)]
#[folder = "site/admin/"]
pub struct AdminAssets;

/// Third-party embed fragments spliced into pages at `<!-- embed:NAME -->` markers
#[derive(Embed)]
#[folder = "site/embeds/"]
pub struct EmbedAssets;
