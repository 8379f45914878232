pub mod resource_cache;
pub mod spawn;

pub use resource_cache::{Resource, ResourceCache};
pub use spawn::spawn;
