mod credentials;
mod steamcmd;

pub use credentials::{load_credentials, Credentials};
pub use steamcmd::{
    workshop_content_dir, DownloadOutcome, DownloadRequest, Login, SteamCmd, WorkshopDownloader,
};
