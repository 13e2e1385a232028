pub mod memory;
pub mod metrics;
pub mod razorpay;
pub mod registration;
pub mod repository;
pub mod token;

pub use memory::InMemoryRegistrationStore;
pub use metrics::{get_metrics, init_metrics};
pub use razorpay::RazorpayClient;
pub use registration::RegistrationService;
pub use repository::{MongoRegistrationStore, RegistrationStore};
pub use token::TokenGenerator;
