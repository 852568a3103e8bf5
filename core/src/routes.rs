//! Navigation and role-based route gating.
//!
//! The host owns actual navigation; this module only decides where a user
//! may go. `RouteTable::prominis` mirrors the application's routing table:
//! public pages, pages for any signed-in user, and role-restricted areas.

use std::sync::{Mutex, PoisonError};

use crate::session::SessionState;
use crate::types::Role;

pub const LOGIN_PATH: &str = "/login";
pub const UNAUTHORIZED_PATH: &str = "/unauthorized";
pub const NOT_FOUND_PATH: &str = "/404";

/// Moves the host UI to another route.
pub trait Navigator: Send + Sync {
    fn navigate(&self, path: &str);

    /// Send the user to the sign-in entry point.
    fn redirect_to_login(&self) {
        self.navigate(LOGIN_PATH);
    }
}

/// Logs navigation requests; for headless hosts.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNavigator;

impl Navigator for LogNavigator {
    fn navigate(&self, path: &str) {
        tracing::info!(path, "navigate");
    }
}

/// Remembers every navigation request in order.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    visits: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn visits(&self) -> Vec<String> {
        self.visits.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn count(&self, path: &str) -> usize {
        self.visits().iter().filter(|visit| visit.as_str() == path).count()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, path: &str) {
        self.visits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(path.to_string());
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Public,
    /// Any signed-in user.
    Authenticated,
    /// Signed-in users holding one of these roles.
    Roles(Vec<Role>),
}

/// Outcome of gating a navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Render,
    /// The session is still being verified; show a placeholder.
    Pending,
    Redirect(&'static str),
}

#[derive(Debug, Clone)]
struct RouteEntry {
    segments: Vec<String>,
    access: Access,
}

#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<RouteEntry>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `pattern`; `:name` segments match any single segment.
    pub fn route(mut self, pattern: &str, access: Access) -> Self {
        self.routes.push(RouteEntry {
            segments: split(pattern).map(str::to_string).collect(),
            access,
        });
        self
    }

    pub fn prominis() -> Self {
        let requester = || Access::Roles(vec![Role::Requester]);
        let tasker = || Access::Roles(vec![Role::Tasker]);
        let admin = || Access::Roles(vec![Role::Admin]);

        Self::new()
            .route("/", Access::Public)
            .route("/login", Access::Public)
            .route("/register", Access::Public)
            .route("/forgot-password", Access::Public)
            .route("/about", Access::Public)
            .route("/404", Access::Public)
            .route("/401", Access::Public)
            .route("/500", Access::Public)
            .route("/unauthorized", Access::Public)
            .route("/dashboard", Access::Authenticated)
            .route("/profile", Access::Authenticated)
            .route("/settings", Access::Authenticated)
            .route("/messages", Access::Authenticated)
            .route("/requester/dashboard", requester())
            .route("/requester/jobs/create", requester())
            .route("/requester/jobs", requester())
            .route("/requester/jobs/:id", requester())
            .route("/tasker/dashboard", tasker())
            .route("/tasker/jobs", tasker())
            .route("/tasker/jobs/:id", tasker())
            .route("/tasker/applications", tasker())
            .route("/tasker/deliverables", tasker())
            .route("/tasker/ratings", tasker())
            .route("/admin/dashboard", admin())
            .route("/admin/users", admin())
            .route("/admin/jobs", admin())
            .route("/admin/audit-logs", admin())
            .route("/admin/analytics", admin())
    }

    /// Access rule of the first route matching `path`.
    pub fn resolve(&self, path: &str) -> Option<&Access> {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let wanted: Vec<&str> = split(path).collect();
        self.routes
            .iter()
            .find(|entry| matches(&entry.segments, &wanted))
            .map(|entry| &entry.access)
    }

    pub fn gate(&self, path: &str, session: &SessionState) -> Gate {
        let Some(access) = self.resolve(path) else {
            return Gate::Redirect(NOT_FOUND_PATH);
        };
        let roles = match access {
            Access::Public => return Gate::Render,
            Access::Authenticated => None,
            Access::Roles(roles) => Some(roles),
        };
        if session.loading {
            return Gate::Pending;
        }
        let Some(user) = &session.user else {
            return Gate::Redirect(LOGIN_PATH);
        };
        match roles {
            Some(roles) if !roles.is_empty() && !roles.contains(&user.role) => {
                Gate::Redirect(UNAUTHORIZED_PATH)
            }
            _ => Gate::Render,
        }
    }
}

fn split(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

fn matches(pattern: &[String], path: &[&str]) -> bool {
    pattern.len() == path.len()
        && pattern
            .iter()
            .zip(path)
            .all(|(expected, actual)| expected.starts_with(':') || expected == actual)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UserSummary;

    fn signed_in(role: Role) -> SessionState {
        SessionState {
            user: Some(UserSummary {
                id: 1,
                first_name: "A".to_string(),
                last_name: "B".to_string(),
                email: "a@b.com".to_string(),
                role,
                phone: None,
                location: None,
                bio: None,
                avatar: None,
            }),
            token: Some("t".to_string()),
            loading: false,
            error: None,
        }
    }

    #[test]
    fn public_routes_render_without_session() {
        let table = RouteTable::prominis();
        assert_eq!(table.gate("/", &SessionState::default()), Gate::Render);
        assert_eq!(table.gate("/login?next=/profile", &SessionState::default()), Gate::Render);
    }

    #[test]
    fn protected_route_redirects_to_login() {
        let table = RouteTable::prominis();
        assert_eq!(table.gate("/profile", &SessionState::default()), Gate::Redirect(LOGIN_PATH));
    }

    #[test]
    fn loading_session_is_pending() {
        let state = SessionState {
            loading: true,
            ..SessionState::default()
        };
        assert_eq!(RouteTable::prominis().gate("/dashboard", &state), Gate::Pending);
    }

    #[test]
    fn role_mismatch_is_unauthorized() {
        let table = RouteTable::prominis();
        assert_eq!(
            table.gate("/admin/users", &signed_in(Role::Tasker)),
            Gate::Redirect(UNAUTHORIZED_PATH)
        );
        assert_eq!(table.gate("/tasker/jobs/42", &signed_in(Role::Tasker)), Gate::Render);
        assert_eq!(table.gate("/messages/", &signed_in(Role::Admin)), Gate::Render);
    }

    #[test]
    fn unknown_path_is_not_found() {
        assert_eq!(
            RouteTable::prominis().gate("/tasker/jobs/1/extra", &signed_in(Role::Tasker)),
            Gate::Redirect(NOT_FOUND_PATH)
        );
    }

    #[test]
    fn recording_navigator_counts_visits() {
        let nav = RecordingNavigator::default();
        nav.redirect_to_login();
        nav.navigate("/404");
        nav.redirect_to_login();
        assert_eq!(nav.count(LOGIN_PATH), 2);
        assert_eq!(nav.visits().len(), 3);
    }
}
