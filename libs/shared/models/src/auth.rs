use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtHeader {
    pub alg: String,
    pub typ: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub exp: Option<u64>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub app_metadata: Option<serde_json::Value>,
    pub user_metadata: Option<serde_json::Value>,
    pub aud: Option<String>,
    pub iat: Option<u64>,
}

/// Authenticated caller as decoded from the bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Patient,
    Doctor,
    Admin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Patient => write!(f, "patient"),
            Role::Doctor => write!(f, "doctor"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "patient" => Ok(Role::Patient),
            "doctor" => Ok(Role::Doctor),
            "admin" => Ok(Role::Admin),
            other => Err(AppError::Forbidden(format!("Unsupported role: {}", other))),
        }
    }
}

/// The identity the scheduling core trusts: who is calling and in which role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Principal {
    pub user_id: Uuid,
    pub role: Role,
}

impl Principal {
    pub fn new(user_id: Uuid, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn patient(user_id: Uuid) -> Self {
        Self::new(user_id, Role::Patient)
    }

    pub fn doctor(user_id: Uuid) -> Self {
        Self::new(user_id, Role::Doctor)
    }

    pub fn admin(user_id: Uuid) -> Self {
        Self::new(user_id, Role::Admin)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// True for the given user acting on their own records, or for an admin.
    pub fn acts_for(&self, user_id: Uuid) -> bool {
        self.is_admin() || self.user_id == user_id
    }
}

impl TryFrom<&User> for Principal {
    type Error = AppError;

    fn try_from(user: &User) -> Result<Self, Self::Error> {
        let user_id = Uuid::parse_str(&user.id)
            .map_err(|_| AppError::Auth(format!("Token subject is not a valid id: {}", user.id)))?;

        let role = user
            .role
            .as_deref()
            .ok_or_else(|| AppError::Forbidden("Token carries no role".to_string()))?
            .parse()?;

        Ok(Self { user_id, role })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn user(id: &str, role: Option<&str>) -> User {
        User {
            id: id.to_string(),
            email: None,
            role: role.map(str::to_string),
            metadata: None,
            created_at: None,
        }
    }

    #[test]
    fn test_principal_from_user() {
        let id = Uuid::new_v4();
        let principal = Principal::try_from(&user(&id.to_string(), Some("Doctor"))).unwrap();

        assert_eq!(principal.user_id, id);
        assert_eq!(principal.role, Role::Doctor);
        assert!(principal.acts_for(id));
        assert!(!principal.acts_for(Uuid::new_v4()));
    }

    #[test]
    fn test_principal_rejects_bad_subject_and_role() {
        assert_matches!(
            Principal::try_from(&user("not-a-uuid", Some("patient"))),
            Err(AppError::Auth(_))
        );
        assert_matches!(
            Principal::try_from(&user(&Uuid::new_v4().to_string(), Some("authenticated"))),
            Err(AppError::Forbidden(_))
        );
        assert_matches!(
            Principal::try_from(&user(&Uuid::new_v4().to_string(), None)),
            Err(AppError::Forbidden(_))
        );
    }

    #[test]
    fn test_admin_acts_for_everyone() {
        let admin = Principal::admin(Uuid::new_v4());
        assert!(admin.acts_for(Uuid::new_v4()));
    }
}
