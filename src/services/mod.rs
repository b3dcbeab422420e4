pub mod access;
pub mod integrity;
pub mod roles;
pub mod seed;
