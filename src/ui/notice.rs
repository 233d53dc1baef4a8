//! One-shot notices carried in a flash cookie and shown by the next page.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};

pub const NOTICE_COOKIE: &str = "dd_notice";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Error,
}

impl NoticeLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoticeLevel::Success => "success",
            NoticeLevel::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    pub title: String,
    pub description: String,
    pub level: NoticeLevel,
}

impl Notice {
    pub fn success(description: impl Into<String>) -> Self {
        Self {
            title: "Success".to_string(),
            description: description.into(),
            level: NoticeLevel::Success,
        }
    }

    pub fn error(description: impl Into<String>) -> Self {
        Self {
            title: "Error".to_string(),
            description: description.into(),
            level: NoticeLevel::Error,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    fn encode(&self) -> Option<String> {
        serde_json::to_vec(self)
            .ok()
            .map(|json| URL_SAFE_NO_PAD.encode(json))
    }

    fn decode(value: &str) -> Option<Self> {
        let json = URL_SAFE_NO_PAD.decode(value).ok()?;
        serde_json::from_slice(&json).ok()
    }
}

/// Queue a notice for the next rendered page
pub fn set_notice(jar: CookieJar, notice: Notice) -> CookieJar {
    let Some(value) = notice.encode() else {
        return jar;
    };
    jar.add(
        Cookie::build((NOTICE_COOKIE, value))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .build(),
    )
}

/// Read and clear the pending notice. A tampered cookie is dropped.
pub fn take_notice(jar: CookieJar) -> (CookieJar, Option<Notice>) {
    let notice = match jar.get(NOTICE_COOKIE) {
        Some(cookie) => Notice::decode(cookie.value()),
        None => return (jar, None),
    };
    let jar = jar.remove(Cookie::build(NOTICE_COOKIE).path("/"));
    (jar, notice)
}

/// Notice as the templates consume it
#[derive(Debug, Clone, Default)]
pub struct NoticeView {
    pub show: bool,
    pub title: String,
    pub description: String,
    pub level: &'static str,
}

impl From<Option<Notice>> for NoticeView {
    fn from(notice: Option<Notice>) -> Self {
        match notice {
            Some(notice) => Self {
                show: true,
                title: notice.title,
                description: notice.description,
                level: notice.level.as_str(),
            },
            None => Self::default(),
        }
    }
}
