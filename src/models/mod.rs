mod entry;
mod partial_id;
mod verification;

pub mod types;

pub use entry::{Entry, EntryId, EntryState, EntryType, NewEntry};
pub use partial_id::PartialId;
pub use verification::{
    MemberStatus, NewVerificationRequest, VerificationId, VerificationRequest, VerificationState,
};
