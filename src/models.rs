use std::fmt;
use std::io::Write;
use std::str::FromStr;

use chrono::NaiveDateTime;
use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::pg::{Pg, PgValue};
use diesel::prelude::*;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Maps a closed enum onto a lowercase text column.
macro_rules! text_enum {
    ($ty:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($ty::$variant),)+
                    other => Err(format!("unknown {} '{}'", stringify!($ty), other)),
                }
            }
        }

        impl ToSql<Text, Pg> for $ty {
            fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
                out.write_all(self.as_str().as_bytes())?;
                Ok(IsNull::No)
            }
        }

        impl FromSql<Text, Pg> for $ty {
            fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
                let text = std::str::from_utf8(bytes.as_bytes())?;
                text.parse().map_err(Into::into)
            }
        }
    };
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow, ToSchema,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Leader,
    Member,
}

text_enum!(MemberRole {
    Leader => "leader",
    Member => "member",
});

impl MemberRole {
    /// Strongest role among possibly duplicated membership rows.
    pub fn strongest(roles: impl IntoIterator<Item = MemberRole>) -> Option<MemberRole> {
        roles.into_iter().fold(None, |acc, role| match (acc, role) {
            (Some(MemberRole::Leader), _) | (_, MemberRole::Leader) => Some(MemberRole::Leader),
            _ => Some(MemberRole::Member),
        })
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsExpression, FromSqlRow, ToSchema,
)]
#[diesel(sql_type = Text)]
pub enum TaskStatus {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "in-progress")]
    InProgress,
    #[serde(rename = "completed")]
    Completed,
}

text_enum!(TaskStatus {
    Pending => "pending",
    InProgress => "in-progress",
    Completed => "completed",
});

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsExpression, FromSqlRow, ToSchema,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    High,
    Medium,
    Low,
}

text_enum!(TaskPriority {
    High => "high",
    Medium => "medium",
    Low => "low",
});

#[derive(Debug, Queryable, Selectable, Serialize, Clone)]
#[diesel(table_name = crate::schema::users)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub hashed_password: String,
    pub is_admin: bool,
    pub profile_picture: Option<String>,
    pub bio: Option<String>,
    pub timezone: Option<String>,
    pub last_login: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: Option<NaiveDateTime>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::users)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub hashed_password: String,
    pub is_admin: bool,
    pub bio: Option<String>,
    pub timezone: Option<String>,
}

#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = crate::schema::users)]
pub struct UserChanges {
    pub username: Option<String>,
    pub email: Option<String>,
    pub hashed_password: Option<String>,
    pub is_admin: Option<bool>,
    pub bio: Option<String>,
    pub timezone: Option<String>,
}

impl UserChanges {
    pub fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.email.is_none()
            && self.hashed_password.is_none()
            && self.is_admin.is_none()
            && self.bio.is_none()
            && self.timezone.is_none()
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize, ToSchema)]
#[diesel(table_name = crate::schema::projects)]
pub struct Project {
    pub id: Uuid,
    #[schema(example = "Alpha")]
    pub name: String,
    #[schema(example = "Internal tooling revamp")]
    pub description: Option<String>,
    pub created_by: Uuid,
    #[schema(example = "active")]
    pub status: String,
    pub deadline: Option<NaiveDateTime>,
    #[schema(example = "backend,q3")]
    pub tags: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: Option<NaiveDateTime>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::projects)]
pub struct NewProject {
    pub name: String,
    pub description: Option<String>,
    pub created_by: Uuid,
    pub status: String,
    pub deadline: Option<NaiveDateTime>,
    pub tags: Option<String>,
}

#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = crate::schema::projects)]
pub struct ProjectChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub deadline: Option<NaiveDateTime>,
    pub tags: Option<String>,
}

impl ProjectChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.deadline.is_none()
            && self.tags.is_none()
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize, ToSchema)]
#[diesel(table_name = crate::schema::project_members)]
pub struct ProjectMember {
    pub id: Uuid,
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub role: MemberRole,
    pub added_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::project_members)]
pub struct NewProjectMember {
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub role: MemberRole,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::tasks)]
pub struct Task {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub due_date: Option<NaiveDateTime>,
    pub estimated_hours: Option<i32>,
    pub actual_hours: Option<i32>,
    pub tags: Option<String>,
    pub attachments: Option<String>,
    pub project_id: Uuid,
    pub assigned_to: Option<Uuid>,
    pub created_at: NaiveDateTime,
    pub updated_at: Option<NaiveDateTime>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::tasks)]
pub struct NewTask {
    pub name: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub due_date: Option<NaiveDateTime>,
    pub estimated_hours: Option<i32>,
    pub tags: Option<String>,
    pub attachments: Option<String>,
    pub project_id: Uuid,
    pub assigned_to: Option<Uuid>,
}

#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = crate::schema::tasks)]
pub struct TaskChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub due_date: Option<NaiveDateTime>,
    pub estimated_hours: Option<i32>,
    pub actual_hours: Option<i32>,
    pub tags: Option<String>,
    pub attachments: Option<String>,
}

impl TaskChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.priority.is_none()
            && self.due_date.is_none()
            && self.estimated_hours.is_none()
            && self.actual_hours.is_none()
            && self.tags.is_none()
            && self.attachments.is_none()
    }
}
