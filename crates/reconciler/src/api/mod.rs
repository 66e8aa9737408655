//! Wire schema of the managed kinds.

pub mod account;
pub mod classroom;
pub mod condition;
pub mod meta;

pub use account::{Account, AccountSpec, AccountStatus};
pub use classroom::{Classroom, ClassroomMembers, ClassroomSpec, ClassroomStatus};
pub use condition::{Condition, ConditionKind, ConditionStatus, find_condition, reason, set_condition};
pub use meta::ObjectMeta;
