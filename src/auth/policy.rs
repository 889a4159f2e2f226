//! Project-scoped authorization.
//!
//! Every decision is a pure function of the caller, the caller's role in the
//! target project (if any) and the requested action. Lookups happen before the
//! call; mutations happen only after an allowing decision.
//!
//! Precedence:
//! 1. global admins are allowed everything in scope,
//! 2. project leaders manage members and tasks of their project,
//! 3. plain members see their own tasks and the member list,
//! 4. everyone else is denied.
//!
//! Status-only task updates sit outside that ladder: only the assignee may
//! change status there, admins and leaders included.

use uuid::Uuid;

use crate::models::MemberRole;

/// Authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: Uuid,
    pub username: String,
    pub is_admin: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Create, update or delete a project.
    ManageProject,
    /// Create, update, delete or list user accounts.
    ManageUsers,
    AssignLeader,
    /// Add or remove project members.
    ManageMembers,
    ViewMembers,
    CreateTask,
    DeleteTask,
    /// Full task update. Open to any authenticated caller.
    UpdateTask,
    /// `assignee` is the user behind the task's membership.
    UpdateTaskStatus { assignee: Option<Uuid> },
    ViewTask { assignee: Option<Uuid> },
    /// `requested_assignee` is the caller-supplied filter, if any.
    ListTasks { requested_assignee: Option<Uuid> },
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::ManageProject => "manage_project",
            Action::ManageUsers => "manage_users",
            Action::AssignLeader => "assign_leader",
            Action::ManageMembers => "manage_members",
            Action::ViewMembers => "view_members",
            Action::CreateTask => "create_task",
            Action::DeleteTask => "delete_task",
            Action::UpdateTask => "update_task",
            Action::UpdateTaskStatus { .. } => "update_task_status",
            Action::ViewTask { .. } => "view_task",
            Action::ListTasks { .. } => "list_tasks",
        }
    }
}

/// Narrowed query scope for callers who may only see their own tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskScope {
    pub assignee: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    AdminRequired,
    LeaderRequired,
    NotAMember,
    NotAssignee,
    ForeignAssigneeFilter,
}

impl DenyReason {
    pub fn message(&self) -> &'static str {
        match self {
            DenyReason::AdminRequired => "Admin access required",
            DenyReason::LeaderRequired => "Project leader or admin access required",
            DenyReason::NotAMember => "You do not have permission to view this project",
            DenyReason::NotAssignee => "You are not permitted to access this task",
            DenyReason::ForeignAssigneeFilter => "You can only view tasks assigned to you",
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            DenyReason::AdminRequired => "ADMIN_REQUIRED",
            DenyReason::LeaderRequired => "LEADER_REQUIRED",
            DenyReason::NotAMember => "NOT_A_MEMBER",
            DenyReason::NotAssignee => "NOT_ASSIGNEE",
            DenyReason::ForeignAssigneeFilter => "FOREIGN_ASSIGNEE_FILTER",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    AllowScoped(TaskScope),
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Decision::Deny(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Decision::Allow => "allow",
            Decision::AllowScoped(_) => "allow_scoped",
            Decision::Deny(_) => "deny",
        }
    }
}

/// Decides whether `principal`, holding `role` in the target project, may perform `action`.
pub fn authorize(principal: &Principal, role: Option<MemberRole>, action: Action) -> Decision {
    if let Action::UpdateTaskStatus { assignee } = action {
        return if assignee == Some(principal.user_id) {
            Decision::Allow
        } else {
            Decision::Deny(DenyReason::NotAssignee)
        };
    }

    if matches!(action, Action::UpdateTask) || principal.is_admin {
        return Decision::Allow;
    }

    match action {
        Action::ManageProject | Action::ManageUsers | Action::AssignLeader => {
            Decision::Deny(DenyReason::AdminRequired)
        }
        Action::ManageMembers | Action::CreateTask | Action::DeleteTask => match role {
            Some(MemberRole::Leader) => Decision::Allow,
            Some(MemberRole::Member) | None => Decision::Deny(DenyReason::LeaderRequired),
        },
        Action::ViewMembers => match role {
            Some(_) => Decision::Allow,
            None => Decision::Deny(DenyReason::NotAMember),
        },
        Action::ViewTask { assignee } => match role {
            Some(MemberRole::Leader) => Decision::Allow,
            Some(MemberRole::Member) if assignee == Some(principal.user_id) => Decision::Allow,
            Some(MemberRole::Member) => Decision::Deny(DenyReason::NotAssignee),
            None => Decision::Deny(DenyReason::NotAMember),
        },
        Action::ListTasks { requested_assignee } => match role {
            Some(MemberRole::Leader) => Decision::Allow,
            Some(MemberRole::Member) => match requested_assignee {
                Some(other) if other != principal.user_id => {
                    Decision::Deny(DenyReason::ForeignAssigneeFilter)
                }
                _ => Decision::AllowScoped(TaskScope {
                    assignee: principal.user_id,
                }),
            },
            None => Decision::Deny(DenyReason::NotAMember),
        },
        Action::UpdateTask | Action::UpdateTaskStatus { .. } => Decision::Allow,
    }
}
