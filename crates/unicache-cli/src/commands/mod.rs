pub mod inspect;
pub mod namespace;
