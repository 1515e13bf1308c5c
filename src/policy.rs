//! Access policy: the single table deciding what each role may do.
//!
//! Pure and deterministic. The engine consults it before every mutating
//! operation and to scope booking visibility.

use std::fmt;

use crate::model::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    CreateBooking,
    ViewAllBookings,
    ViewOwnBookings,
    ApproveOrReject,
    WithdrawOwnBooking,
    ManageResourceStatus,
    CreateResource,
    EditResource,
    DeleteResource,
}

impl Action {
    pub const ALL: [Action; 9] = [
        Action::CreateBooking,
        Action::ViewAllBookings,
        Action::ViewOwnBookings,
        Action::ApproveOrReject,
        Action::WithdrawOwnBooking,
        Action::ManageResourceStatus,
        Action::CreateResource,
        Action::EditResource,
        Action::DeleteResource,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::CreateBooking => "create_booking",
            Action::ViewAllBookings => "view_all_bookings",
            Action::ViewOwnBookings => "view_own_bookings",
            Action::ApproveOrReject => "approve_or_reject",
            Action::WithdrawOwnBooking => "withdraw_own_booking",
            Action::ManageResourceStatus => "manage_resource_status",
            Action::CreateResource => "create_resource",
            Action::EditResource => "edit_resource",
            Action::DeleteResource => "delete_resource",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether `role` may perform `action`. `is_owner` only matters for the
/// owner-scoped actions (viewing and withdrawing one's own bookings).
pub fn can_perform(role: Role, action: Action, is_owner: bool) -> bool {
    use Action::*;
    use Role::*;

    match (action, role) {
        (_, Admin) => true,

        (CreateBooking, Lecturer | Student) => true,
        (CreateBooking, Maintenance) => false,

        (ViewOwnBookings, _) => is_owner,
        (WithdrawOwnBooking, Lecturer | Student) => is_owner,
        (WithdrawOwnBooking, Maintenance) => false,

        (ManageResourceStatus, Maintenance) => true,
        (ManageResourceStatus, Lecturer | Student) => false,

        (ViewAllBookings | ApproveOrReject | CreateResource | EditResource | DeleteResource, _) => {
            false
        }
    }
}

/// Whether bookings created by `role` skip review. Only admins do.
pub fn auto_approves(role: Role) -> bool {
    role == Role::Admin
}

#[cfg(test)]
mod tests {
    use super::*;
    use Action::*;

    /// Expected grants with `is_owner = true`, row per action in `Action::ALL`
    /// order, columns admin, lecturer, student, maintenance.
    const MATRIX: [(Action, [bool; 4]); 9] = [
        (CreateBooking, [true, true, true, false]),
        (ViewAllBookings, [true, false, false, false]),
        (ViewOwnBookings, [true, true, true, true]),
        (ApproveOrReject, [true, false, false, false]),
        (WithdrawOwnBooking, [true, true, true, false]),
        (ManageResourceStatus, [true, false, false, true]),
        (CreateResource, [true, false, false, false]),
        (EditResource, [true, false, false, false]),
        (DeleteResource, [true, false, false, false]),
    ];

    #[test]
    fn full_matrix_as_owner() {
        for (action, row) in MATRIX {
            for (role, expected) in Role::ALL.into_iter().zip(row) {
                assert_eq!(
                    can_perform(role, action, true),
                    expected,
                    "{role} / {action}"
                );
            }
        }
    }

    #[test]
    fn matrix_covers_every_action() {
        let listed: Vec<Action> = MATRIX.iter().map(|(a, _)| *a).collect();
        assert_eq!(listed, Action::ALL.to_vec());
    }

    #[test]
    fn ownership_only_matters_for_owner_scoped_actions() {
        for action in Action::ALL {
            for role in Role::ALL {
                let owner = can_perform(role, action, true);
                let other = can_perform(role, action, false);
                let owner_scoped = matches!(action, ViewOwnBookings | WithdrawOwnBooking)
                    && role != Role::Admin;
                if owner_scoped {
                    assert!(!other, "{role} / {action} must require ownership");
                } else {
                    assert_eq!(owner, other, "{role} / {action} must ignore ownership");
                }
            }
        }
    }

    #[test]
    fn admin_sees_others_bookings() {
        assert!(can_perform(Role::Admin, ViewOwnBookings, false));
        assert!(!can_perform(Role::Student, ViewOwnBookings, false));
    }

    #[test]
    fn only_admin_auto_approves() {
        assert!(auto_approves(Role::Admin));
        assert!(!auto_approves(Role::Lecturer));
        assert!(!auto_approves(Role::Student));
        assert!(!auto_approves(Role::Maintenance));
    }
}
