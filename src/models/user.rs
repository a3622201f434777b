use serde::Serialize;

/// A registered user, without credentials
#[derive(Debug, Clone, Serialize, PartialEq, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}
