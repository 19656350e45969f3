//! In-process session storage and change propagation.

mod notifier;
mod repository;

pub use notifier::{ChangeNotifier, Observer, ObserverId, Subscription};
pub use repository::SessionRepository;
