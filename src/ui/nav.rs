//! Navigation header items derived from the session gate state.

use crate::session::GateState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavItem {
    pub label: &'static str,
    pub href: &'static str,
}

/// Header as the templates consume it. Hidden while loading and when
/// signed out.
#[derive(Debug, Clone, Default)]
pub struct NavView {
    pub show: bool,
    pub items: Vec<NavItem>,
}

pub fn nav_items(state: &GateState) -> Vec<NavItem> {
    if state.is_loading() || state.session.is_none() {
        return Vec::new();
    }

    let mut items = vec![
        NavItem {
            label: "Dashboard",
            href: "/account",
        },
        NavItem {
            label: "Deals",
            href: "/deals",
        },
    ];
    if state.is_admin {
        items.push(NavItem {
            label: "Admin",
            href: "/admin",
        });
    }
    items
}

impl From<&GateState> for NavView {
    fn from(state: &GateState) -> Self {
        let items = nav_items(state);
        Self {
            show: !items.is_empty(),
            items,
        }
    }
}
