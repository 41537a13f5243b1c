pub mod raw_url;
pub mod remote;
pub mod repository;

pub use remote::{MirrorOutcome, PushOutcome};
pub use repository::{SyncRepo, REMOTE_NAME};
