pub mod audit;
pub mod batch;
pub mod catalog;
pub mod change;
pub mod config;
pub mod fingerprint;
pub mod links;
pub mod linkspec;
pub mod lock;
pub mod normalize;
pub mod paths;
pub mod pipeline;
pub mod placement;
pub mod record;
pub mod sweep;
pub mod util;
pub mod verify;
pub mod warn;
