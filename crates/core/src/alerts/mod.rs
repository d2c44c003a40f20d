mod alerts_model;
mod alerts_traits;

pub use alerts_model::{
    Alert, AlertKind, AlertRule, AlertSeverity, NewAlert, RuleAction, RuleConditions,
};
pub use alerts_traits::AlertRepositoryTrait;
