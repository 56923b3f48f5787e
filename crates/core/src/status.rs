//! Permit status enums mapping to SMALLINT lookup tables.
//!
//! Each enum variant's discriminant matches the seed data order (1-based)
//! in the corresponding `*_statuses` database table. A permit carries one
//! status on each axis; the pair drives the transition table in
//! [`crate::workflow`].

/// Status ID type matching SMALLINT/SMALLSERIAL in the database.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident ($label:literal) = $val:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $val ),+
        }

        impl $name {
            /// Return the database status ID.
            pub fn id(self) -> StatusId {
                self as StatusId
            }

            /// Resolve a database status ID back into the enum.
            pub fn from_id(id: StatusId) -> Option<Self> {
                match id {
                    $( $val => Some(Self::$variant), )+
                    _ => None,
                }
            }

            /// Human-readable label matching the lookup table's `name` column.
            pub fn label(self) -> &'static str {
                match self {
                    $( Self::$variant => $label, )+
                }
            }
        }

        impl From<$name> for StatusId {
            fn from(value: $name) -> Self {
                value as StatusId
            }
        }
    };
}

define_status_enum! {
    /// Document-review axis of a permit request.
    ReviewStatus {
        /// Awaiting a reviewer's decision.
        PendingReview ("pending_review") = 1,
        /// Documents meet the requirements; eligible for approval.
        MeetsRequirements ("meets_requirements") = 2,
        /// Documents do not meet the requirements; vendor may resubmit.
        NotMeetsRequirements ("not_meets_requirements") = 3,
    }
}

define_status_enum! {
    /// Approval axis of a permit request. `Approved` and `Rejected` are
    /// terminal.
    ApprovalStatus {
        /// Awaiting an approver's decision.
        PendingApproval ("pending_approval") = 1,
        /// Approved; a sequence number has been attached.
        Approved ("approved") = 2,
        /// Rejected by an approver. Final; not resubmittable.
        Rejected ("rejected") = 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip() {
        for status in [
            ReviewStatus::PendingReview,
            ReviewStatus::MeetsRequirements,
            ReviewStatus::NotMeetsRequirements,
        ] {
            assert_eq!(ReviewStatus::from_id(status.id()), Some(status));
        }
        for status in [
            ApprovalStatus::PendingApproval,
            ApprovalStatus::Approved,
            ApprovalStatus::Rejected,
        ] {
            assert_eq!(ApprovalStatus::from_id(status.id()), Some(status));
        }
    }

    #[test]
    fn unknown_id_is_none() {
        assert_eq!(ReviewStatus::from_id(0), None);
        assert_eq!(ReviewStatus::from_id(4), None);
        assert_eq!(ApprovalStatus::from_id(-1), None);
    }

    #[test]
    fn labels_match_seed_names() {
        assert_eq!(ReviewStatus::PendingReview.label(), "pending_review");
        assert_eq!(ApprovalStatus::Approved.label(), "approved");
    }
}
