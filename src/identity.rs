use std::collections::HashMap;
use std::io::{self, ErrorKind};
use std::path::Path;

use serde::Deserialize;

use crate::model::{Principal, Role};

/// One directory entry. `login` is what clients send as the connection user.
#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryUser {
    pub id: String,
    pub login: String,
    pub password: String,
    pub name: String,
    pub role: Role,
    #[serde(default)]
    pub department: Option<String>,
}

#[derive(Deserialize)]
struct DirectoryFile {
    users: Vec<DirectoryUser>,
}

/// Who may connect, and as which principal.
#[derive(Debug, Default)]
pub struct PrincipalDirectory {
    users: Vec<DirectoryUser>,
    by_login: HashMap<String, usize>,
}

impl PrincipalDirectory {
    pub fn from_users(users: Vec<DirectoryUser>) -> io::Result<Self> {
        let mut by_login = HashMap::with_capacity(users.len());
        let mut ids = std::collections::HashSet::with_capacity(users.len());
        for (i, user) in users.iter().enumerate() {
            if user.login.is_empty() || user.id.is_empty() {
                return Err(io::Error::new(ErrorKind::InvalidData, "directory user without id or login"));
            }
            if by_login.insert(user.login.clone(), i).is_some() {
                return Err(io::Error::new(
                    ErrorKind::InvalidData,
                    format!("duplicate login in directory: {}", user.login),
                ));
            }
            if !ids.insert(user.id.as_str()) {
                return Err(io::Error::new(
                    ErrorKind::InvalidData,
                    format!("duplicate id in directory: {}", user.id),
                ));
            }
        }
        Ok(Self { users, by_login })
    }

    /// Parse `{ "users": [ { id, login, password, name, role, department? } ] }`.
    pub fn from_json(json: &str) -> io::Result<Self> {
        let file: DirectoryFile =
            serde_json::from_str(json).map_err(|e| io::Error::new(ErrorKind::InvalidData, e))?;
        Self::from_users(file.users)
    }

    pub fn load(path: &Path) -> io::Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            io::Error::new(e.kind(), format!("reading directory {}: {e}", path.display()))
        })?;
        Self::from_json(&json)
    }

    fn user(&self, login: &str) -> Option<&DirectoryUser> {
        self.by_login.get(login).map(|&i| &self.users[i])
    }

    /// The principal a login acts as, or `None` if it is unknown.
    pub fn principal_for(&self, login: &str) -> Option<Principal> {
        self.user(login).map(|u| Principal {
            id: u.id.clone(),
            role: u.role,
            name: u.name.clone(),
            department: u.department.clone(),
        })
    }

    pub fn password_for(&self, login: &str) -> Option<&str> {
        self.user(login).map(|u| u.password.as_str())
    }

    /// First admin in file order. Used to attribute catalog seeding.
    pub fn first_admin(&self) -> Option<Principal> {
        self.users
            .iter()
            .find(|u| u.role == Role::Admin)
            .and_then(|u| self.principal_for(&u.login))
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
