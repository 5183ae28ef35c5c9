use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Role {
    /// Professor, allowed to take the roll call
    #[serde(rename = "P")]
    Professor,
    /// Student ("aluno")
    #[serde(rename = "A")]
    Student,
    #[serde(other)]
    Unknown,
}

/// Authenticated user as returned by `GET /users/data`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    /// Registration number
    pub ra: i64,
    pub surname: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl User {
    pub fn is_professor(&self) -> bool {
        self.role == Role::Professor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_wire_format() {
        let user: User = serde_json::from_value(serde_json::json!({
            "ra": 1234,
            "surname": "Souza",
            "role": "P",
            "message": "Bem-vindo"
        }))
        .unwrap();
        assert!(user.is_professor());

        let user: User = serde_json::from_value(serde_json::json!({
            "ra": 99,
            "surname": "Lima",
            "role": "X"
        }))
        .unwrap();
        assert_eq!(user.role, Role::Unknown);
        assert_eq!(user.message, None);
    }
}
