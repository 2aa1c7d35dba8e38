pub mod credentials;
pub mod jobs;
pub mod storage;
pub mod tokens;
