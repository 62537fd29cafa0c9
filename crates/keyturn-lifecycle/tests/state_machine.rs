//! Property tests for the operation state machine.

use keyturn_lifecycle::{OperationKind, OperationReport, OperationState};
use proptest::prelude::*;

fn any_state() -> impl Strategy<Value = OperationState> {
    prop_oneof![
        Just(OperationState::Pending),
        Just(OperationState::Applying),
        Just(OperationState::Verifying),
        Just(OperationState::Complete),
        Just(OperationState::Failed),
    ]
}

proptest! {
    #[test]
    fn terminal_reports_never_move(steps in prop::collection::vec(any_state(), 1..20)) {
        let mut report = OperationReport::new(OperationKind::Rotate);
        for next in steps {
            let before = report.state;
            let result = report.transition(next);
            if before.is_terminal() {
                prop_assert!(result.is_err());
                prop_assert_eq!(report.state, before);
            } else if result.is_ok() {
                prop_assert!(before.can_transition_to(next));
                prop_assert_eq!(report.state, next);
            } else {
                prop_assert_eq!(report.state, before);
            }
        }
    }

    #[test]
    fn complete_is_only_reached_through_verifying(steps in prop::collection::vec(any_state(), 1..20)) {
        let mut report = OperationReport::new(OperationKind::Create);
        let mut visited = vec![report.state];
        for next in steps {
            if report.transition(next).is_ok() {
                visited.push(next);
            }
        }
        if report.state == OperationState::Complete {
            prop_assert_eq!(
                visited,
                vec![
                    OperationState::Pending,
                    OperationState::Applying,
                    OperationState::Verifying,
                    OperationState::Complete,
                ]
            );
        }
    }
}
