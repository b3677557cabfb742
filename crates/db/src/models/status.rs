//! Status helper enums mapping to SMALLINT lookup tables.
//!
//! Each enum variant's discriminant matches the seed data order (1-based)
//! in the corresponding lookup table created by the initial migration.

/// Status ID type matching SMALLINT/SMALLSERIAL in the database.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:expr ),+ $(,)?
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

            /// Resolve a database status ID back to the enum.
            pub fn try_from_id(id: StatusId) -> Option<Self> {
                match id {
                    $( $val => Some(Self::$variant), )+
                    _ => None,
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
    /// Resource ownership lifetime.
    ResourceLifetime {
        Permanent = 1,
        Temporary = 2,
    }
}

define_status_enum! {
    /// Role a stored image plays.
    ResourceRole {
        SourcePhoto = 1,
        TemplateOriginal = 2,
        TemplateMasked = 3,
        Result = 4,
    }
}

define_status_enum! {
    /// Template preprocessing pipeline status.
    PreprocessingStatus {
        NotStarted = 1,
        Pending = 2,
        Processing = 3,
        Completed = 4,
        Failed = 5,
    }
}

define_status_enum! {
    /// Swap task execution status.
    TaskStatus {
        Pending = 1,
        Running = 2,
        Completed = 3,
        Failed = 4,
        Canceled = 5,
    }
}

impl ResourceLifetime {
    /// Map to the domain lifetime used by retention logic.
    pub fn as_domain(self) -> faceforge_core::retention::Lifetime {
        match self {
            Self::Permanent => faceforge_core::retention::Lifetime::Permanent,
            Self::Temporary => faceforge_core::retention::Lifetime::Temporary,
        }
    }
}

impl TaskStatus {
    /// Map to the domain state machine representation.
    pub fn as_state(self) -> faceforge_core::task::TaskState {
        use faceforge_core::task::TaskState;
        match self {
            Self::Pending => TaskState::Pending,
            Self::Running => TaskState::Running,
            Self::Completed => TaskState::Completed,
            Self::Failed => TaskState::Failed,
            Self::Canceled => TaskState::Canceled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifetime_ids_match_seed_data() {
        assert_eq!(ResourceLifetime::Permanent.id(), 1);
        assert_eq!(ResourceLifetime::Temporary.id(), 2);
    }

    #[test]
    fn role_ids_match_seed_data() {
        assert_eq!(ResourceRole::SourcePhoto.id(), 1);
        assert_eq!(ResourceRole::TemplateOriginal.id(), 2);
        assert_eq!(ResourceRole::TemplateMasked.id(), 3);
        assert_eq!(ResourceRole::Result.id(), 4);
    }

    #[test]
    fn preprocessing_ids_match_seed_data() {
        assert_eq!(PreprocessingStatus::NotStarted.id(), 1);
        assert_eq!(PreprocessingStatus::Pending.id(), 2);
        assert_eq!(PreprocessingStatus::Processing.id(), 3);
        assert_eq!(PreprocessingStatus::Completed.id(), 4);
        assert_eq!(PreprocessingStatus::Failed.id(), 5);
    }

    #[test]
    fn task_ids_match_seed_data() {
        assert_eq!(TaskStatus::Pending.id(), 1);
        assert_eq!(TaskStatus::Running.id(), 2);
        assert_eq!(TaskStatus::Completed.id(), 3);
        assert_eq!(TaskStatus::Failed.id(), 4);
        assert_eq!(TaskStatus::Canceled.id(), 5);
    }

    #[test]
    fn try_from_id_round_trips() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::Running,
            TaskStatus::Completed,
            TaskStatus::Failed,
            TaskStatus::Canceled,
        ] {
            assert_eq!(TaskStatus::try_from_id(status.id()), Some(status));
        }
        assert_eq!(TaskStatus::try_from_id(99), None);
    }

    #[test]
    fn task_status_maps_onto_domain_state() {
        use faceforge_core::task::TaskState;
        assert_eq!(TaskStatus::Running.as_state(), TaskState::Running);
        assert_eq!(TaskStatus::Canceled.as_state(), TaskState::Canceled);
    }
}
