pub mod bundle;
pub mod checkout_session;
pub mod discount_code;
pub mod plan;
pub mod program;
pub mod purchase_record;
pub mod subscription_log;
pub mod user_profile;

pub use bundle::Entity as Bundle;
pub use checkout_session::Entity as CheckoutSession;
pub use discount_code::Entity as DiscountCode;
pub use plan::Entity as Plan;
pub use program::Entity as Program;
pub use purchase_record::Entity as PurchaseRecord;
pub use subscription_log::Entity as SubscriptionLog;
pub use user_profile::Entity as UserProfile;
