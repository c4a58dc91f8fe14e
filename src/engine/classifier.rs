use serde::{Deserialize, Serialize};
use url::Url;

/// Step of the portal login workflow a page belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageKind {
    Login,
    Otp,
    SelectUser,
    Dashboard,
    Unknown,
}

/// Path markers in priority order. The portal's page names are not prefix-free,
/// so the order mirrors the navigation sequence and the first hit wins.
const PATH_MARKERS: &[(&str, PageKind)] = &[
    ("login.php", PageKind::Login),
    ("checkOtp.php", PageKind::Otp),
    ("Submit_Otp.php", PageKind::SelectUser),
    ("prtlDashboard.php", PageKind::Dashboard),
];

impl PageKind {
    pub fn classify(url: &str) -> PageKind {
        match Url::parse(url) {
            Ok(parsed) => Self::classify_path(parsed.path()),
            Err(_) => PageKind::Unknown,
        }
    }

    pub fn classify_path(path: &str) -> PageKind {
        PATH_MARKERS
            .iter()
            .find(|(marker, _)| path.contains(marker))
            .map(|(_, kind)| *kind)
            .unwrap_or(PageKind::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PageKind::Login => "login",
            PageKind::Otp => "otp",
            PageKind::SelectUser => "select_user",
            PageKind::Dashboard => "dashboard",
            PageKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for PageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One navigation: where the page is and what step it is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageContext {
    pub url: String,
    pub page_kind: PageKind,
}

impl PageContext {
    pub fn from_url(url: impl Into<String>) -> Self {
        let url = url.into();
        let page_kind = PageKind::classify(&url);
        Self { url, page_kind }
    }
}

/// Login prefill values carried in the query string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginParameters {
    pub mobile: Option<String>,
    pub discom: Option<String>,
}

impl LoginParameters {
    pub fn from_url(url: &str) -> Self {
        let Ok(parsed) = Url::parse(url) else {
            return Self::default();
        };

        let mut params = Self::default();
        for (key, value) in parsed.query_pairs() {
            if value.is_empty() {
                continue;
            }
            match key.as_ref() {
                "mobile" if params.mobile.is_none() => params.mobile = Some(value.into_owned()),
                "discom" if params.discom.is_none() => params.discom = Some(value.into_owned()),
                _ => {}
            }
        }
        params
    }

    /// Both values, or `None` if either is missing.
    pub fn complete(&self) -> Option<(&str, &str)> {
        Some((self.mobile.as_deref()?, self.discom.as_deref()?))
    }
}

/// True when `url` is served from `hostname` (case-insensitive, exact host).
pub fn is_portal_host(url: &str, hostname: &str) -> bool {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.eq_ignore_ascii_case(hostname)))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_known_pages() {
        let base = "https://portal.guvnl.in";
        assert_eq!(PageKind::classify(&format!("{}/login.php", base)), PageKind::Login);
        assert_eq!(PageKind::classify(&format!("{}/checkOtp.php", base)), PageKind::Otp);
        assert_eq!(PageKind::classify(&format!("{}/Submit_Otp.php", base)), PageKind::SelectUser);
        assert_eq!(
            PageKind::classify(&format!("{}/prtlDashboard.php?tab=1", base)),
            PageKind::Dashboard
        );
    }

    #[test]
    fn test_classify_ignores_query_string() {
        // A marker in the query string is not a page.
        assert_eq!(
            PageKind::classify("https://portal.guvnl.in/index.php?next=login.php"),
            PageKind::Unknown
        );
    }

    #[test]
    fn test_classify_priority_is_first_match() {
        assert_eq!(PageKind::classify_path("/login.php/checkOtp.php"), PageKind::Login);
        assert_eq!(PageKind::classify_path("/checkOtp.php/Submit_Otp.php"), PageKind::Otp);
    }

    #[test]
    fn test_classify_unparseable_is_unknown() {
        assert_eq!(PageKind::classify("not a url"), PageKind::Unknown);
        assert_eq!(PageKind::classify("https://portal.guvnl.in/"), PageKind::Unknown);
    }

    #[test]
    fn test_login_parameters_decode_and_skip_empty() {
        let params = LoginParameters::from_url(
            "https://portal.guvnl.in/login.php?mobile=9998887770&discom=DGVCL%20Ltd",
        );
        assert_eq!(params.mobile.as_deref(), Some("9998887770"));
        assert_eq!(params.discom.as_deref(), Some("DGVCL Ltd"));
        assert!(params.complete().is_some());

        let partial =
            LoginParameters::from_url("https://portal.guvnl.in/login.php?mobile=&discom=DGVCL");
        assert_eq!(partial.mobile, None);
        assert!(partial.complete().is_none());
    }

    #[test]
    fn test_portal_host_gate() {
        assert!(is_portal_host("https://portal.guvnl.in/login.php", "portal.guvnl.in"));
        assert!(is_portal_host("https://PORTAL.guvnl.in/login.php", "portal.guvnl.in"));
        assert!(!is_portal_host(
            "https://evil.example/portal.guvnl.in/login.php",
            "portal.guvnl.in"
        ));
        assert!(!is_portal_host("about:blank", "portal.guvnl.in"));
    }
}
