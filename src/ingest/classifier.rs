//! Activity classification
//!
//! Pure routing decision from the envelope's (verb, object kind) pair.
//! Lenient on purpose: the fediverse ships activities with missing or
//! unknown markers, and dropping them at the edge loses real content.

use super::envelope::{InboundActivity, ObjectKind, Verb};

/// Routing outcome for one activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    /// New content to materialize
    Creation,
    /// Reblog/announce of existing content
    Share,
    /// Removal of previously federated content
    Deletion,
    /// Recognized but intentionally ignored
    Unsupported,
}

/// Classify an activity.
///
/// Post-verb activities count as creations for note, comment and bare
/// activity objects alike. Shares and deletes route on the verb alone,
/// whatever object kind they declare.
pub fn classify(activity: &InboundActivity) -> ActivityKind {
    match activity.verb {
        Verb::Share => ActivityKind::Share,
        Verb::Delete => ActivityKind::Deletion,
        Verb::Post => match activity.object_kind {
            ObjectKind::Note | ObjectKind::Comment | ObjectKind::Activity => {
                ActivityKind::Creation
            }
            ObjectKind::Other => ActivityKind::Unsupported,
        },
        Verb::Other => ActivityKind::Unsupported,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn activity(verb: Verb, object_kind: ObjectKind) -> InboundActivity {
        let mut activity = InboundActivity::new("https://remote.example/activities/1", verb);
        activity.object_kind = object_kind;
        activity
    }

    #[test]
    fn post_of_content_kinds_is_creation() {
        for kind in [ObjectKind::Note, ObjectKind::Comment, ObjectKind::Activity] {
            assert_eq!(classify(&activity(Verb::Post, kind)), ActivityKind::Creation);
        }
    }

    #[test]
    fn share_and_delete_route_on_verb_alone() {
        for kind in [ObjectKind::Note, ObjectKind::Other] {
            assert_eq!(classify(&activity(Verb::Share, kind)), ActivityKind::Share);
            assert_eq!(classify(&activity(Verb::Delete, kind)), ActivityKind::Deletion);
        }
    }

    #[test]
    fn unknown_combinations_are_unsupported() {
        assert_eq!(
            classify(&activity(Verb::Post, ObjectKind::Other)),
            ActivityKind::Unsupported
        );
        assert_eq!(
            classify(&activity(Verb::Other, ObjectKind::Note)),
            ActivityKind::Unsupported
        );
    }
}
