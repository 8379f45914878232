pub mod resource_cache;
