//! Backend commands queued from UI to backend worker.

use std::path::PathBuf;

pub enum BackendCommand {
    SelectImage { path: PathBuf },
    Upload { server_url: String, num_colors: u8 },
}
