//! slirp4netns: capability probing, option handling and process launch.

pub mod args;
pub mod dad;
pub mod features;
pub mod options;
pub mod setup;

pub use features::SlirpFeatures;
pub use options::NetworkOptions;
pub use setup::{NetnsTarget, PortForward, SlirpNetwork, SlirpRequest, setup_slirp4netns};
