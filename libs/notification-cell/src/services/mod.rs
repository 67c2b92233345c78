pub mod notification;
pub mod side_effects;

pub use notification::NotificationService;
pub use side_effects::SideEffectWriter;
