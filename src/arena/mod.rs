// =============================================================================
// Arena Module — bandit selection over strategy profiles
// =============================================================================
//
// Each StrategyProfile is an arm. Eligible decisions pull an arm; the pull
// waits in a durable pending ledger until the trade's outcome arrives, and
// only then counts toward the arm's reward estimate.

pub mod arm;
pub mod ledger;
pub mod policy;
pub mod profile;
pub mod selector;
pub mod store;

pub use arm::BanditArm;
pub use ledger::{PendingLedger, PendingPull, Resolution};
pub use policy::SelectionPolicy;
pub use profile::{default_profiles, StrategyProfile};
pub use selector::{BanditArmSelector, BanditConfig, UpdateOutcome};
pub use store::{BanditState, BanditStore};
