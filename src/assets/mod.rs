mod config;
mod embed;
mod handlers;
mod response;

pub use config::AssetsState;
pub use embed::{AdminAssets, EmbedAssets, LoginAssets, PublicAssets};
pub use handlers::{admin_handler, frontend_handler, login_handler};
pub use response::render_script_tag;
