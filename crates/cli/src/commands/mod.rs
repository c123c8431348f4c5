pub mod checkpoints;
pub mod config_cmd;
pub mod doctor;
pub mod setup;
pub mod storage;
