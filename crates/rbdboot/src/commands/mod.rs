pub mod boot;
pub mod completion;
pub mod device;
pub mod map;
pub mod unmap;
