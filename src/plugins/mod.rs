pub mod notifiers;
pub mod traits;
