//! Exposure probes
//!
//! Each probe is independent and fails closed: a transport error, an
//! unexpected status or an unparsable body all read as "not exposed".

use crate::http::{Fetched, TargetClient};
use crate::model::Exposure;
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, warn};

const UPLOADS_PATH: &str = "/wp-content/uploads/";
const XMLRPC_PATH: &str = "/xmlrpc.php";
const CRON_PATH: &str = "/wp-cron.php";
const USERS_PATH: &str = "/wp-json/wp/v2/users";

const LOGIN_PATHS: &[&str] = &[
    "/wp-admin/login.php",
    "/wp-admin/wp-login.php",
    "/login.php",
    "/wp-login.php",
];

/// Registration page markers; newer releases spell "Email" without the dash
const REGISTER_TITLE: &str = "Register For This Site";
const REGISTER_EMAIL_MARKERS: &[&str] = &["E-mail", "Email"];

/// Backup and leftover copies of wp-config.php seen in the wild
const CONFIG_PATHS: &[&str] = &[
    "/wp-config.php",
    "/wp-config.inc",
    "/wp-config.old",
    "/wp-config.txt",
    "/wp-config.php~",
    "/config.php.zip",
    "/config.php.new",
    "/wp-config.php.bk",
    "/wp-config.backup",
    "/config.php.tar.gz",
    "/wp-config.php.txt",
    "/wp-config.php.bak",
    "/wp-config.php.BAK",
    "/wp-config.php.old",
    "/wp-config.php.OLD",
    "/wp-config.php.dist",
    "/wp-config.php.inc",
    "/wp-config.php.swp",
    "/wp-config.php.html",
    "/.wp-config.php.swp",
    "/wp-config.php.save",
    "/wp-config.php.SAVE",
    "/wp-config.php.orig",
    "/wp-config.php_orig",
    "/wp-config-sample.php",
    "/wp-config-backup.txt",
    "/wp-config.php-backup",
    "/common/config.php.new",
    "/wp-config.php.original",
    "/_wpeprivate/config.json",
];

const CONFIG_MARKERS: &[&str] = &["DB_NAME", "DB_PASSWORD", "DBNAME", "PASSWORD", "DB_USERNAME"];

const DEBUG_LOG_DIRS: &[&str] = &["wp-content", "wordpress", "wp", "blog"];

/// XML-RPC methods that expose pingback (SSRF / DDoS amplification)
const PINGBACK_METHODS: &[&str] = &["pingback.extensions.getPingbacks", "pingback.ping"];

/// Fault code returned when a pingback method is live and processed the call
const PINGBACK_LIVE_FAULT: i64 = 0;

static INDEX_OF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Index\s*Of").expect("valid regex"));

// e.g. "[12-Mar-2024 10:15:01 UTC] PHP Warning:"
static PHP_LOG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[0-9]{2}-[a-zA-Z]{3}-[0-9]{4} [0-9]{2}:[0-9]{2}:[0-9]{2} [A-Z]{3}\] PHP")
        .expect("valid regex")
});

static XML_STRING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<string>\s*([^<]*?)\s*</string>").expect("valid regex"));

static XML_FAULT_CODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<fault>.*?<name>\s*faultCode\s*</name>\s*<value>\s*<(?:int|i4)>\s*(-?\d+)\s*</(?:int|i4)>")
        .expect("valid regex")
});

fn method_call(method: &str) -> String {
    format!(
        "<?xml version=\"1.0\"?><methodCall><methodName>{}</methodName><params></params></methodCall>",
        method
    )
}

/// Method names from a `system.listMethods` response
pub fn parse_method_list(xml: &str) -> Vec<String> {
    if !xml.contains("<methodResponse") || !xml.contains("<array>") || xml.contains("<fault>") {
        return Vec::new();
    }
    XML_STRING_RE
        .captures_iter(xml)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Fault code of an XML-RPC fault response
pub fn parse_fault_code(xml: &str) -> Option<i64> {
    XML_FAULT_CODE_RE.captures(xml)?.get(1)?.as_str().parse().ok()
}

/// The probe suite bound to one target
pub struct ProbeSuite {
    client: TargetClient,
}

impl ProbeSuite {
    /// Order in which exposure probes are run and recorded
    pub const ORDER: [Exposure; 8] = [
        Exposure::DirectoryListing,
        Exposure::XmlRpc,
        Exposure::WpCron,
        Exposure::WpLogin,
        Exposure::ConfigLeak,
        Exposure::Registration,
        Exposure::DebugLog,
        Exposure::OembedSsrf,
    ];

    pub fn new(client: TargetClient) -> Self {
        Self { client }
    }

    /// Run the probe for one exposure
    pub async fn check(&self, exposure: Exposure) -> bool {
        match exposure {
            Exposure::DirectoryListing => self.directory_listing().await,
            Exposure::XmlRpc => self.xmlrpc().await,
            Exposure::WpCron => self.wp_cron().await,
            Exposure::WpLogin => self.wp_login().await,
            Exposure::ConfigLeak => self.config_leak().await,
            Exposure::Registration => self.registration().await,
            Exposure::DebugLog => self.debug_log().await,
            Exposure::OembedSsrf => self.oembed_ssrf().await,
        }
    }

    /// GET that treats any transport error as absence
    async fn fetch(&self, path: &str) -> Option<Fetched> {
        match self.client.get(path).await {
            Ok(fetched) => Some(fetched),
            Err(e) => {
                debug!(path, error = %e, "probe request failed");
                None
            }
        }
    }

    async fn fetch_ok(&self, path: &str) -> Option<Fetched> {
        self.fetch(path).await.filter(Fetched::is_ok)
    }

    pub async fn directory_listing(&self) -> bool {
        self.fetch_ok(UPLOADS_PATH)
            .await
            .is_some_and(|f| INDEX_OF_RE.is_match(&f.body))
    }

    /// Pingback methods answering through XML-RPC
    pub async fn xmlrpc(&self) -> bool {
        let listed = match self
            .client
            .post_xml(XMLRPC_PATH, method_call("system.listMethods"))
            .await
        {
            Ok(fetched) if fetched.is_ok() => parse_method_list(&fetched.body),
            Ok(_) => return false,
            Err(e) => {
                debug!(error = %e, "xmlrpc probe failed");
                return false;
            }
        };

        for method in listed.iter().filter(|m| PINGBACK_METHODS.contains(&m.as_str())) {
            let response = match self.client.post_xml(XMLRPC_PATH, method_call(method)).await {
                Ok(fetched) => fetched,
                Err(e) => {
                    debug!(method = %method, error = %e, "xmlrpc method call failed");
                    return false;
                }
            };
            if parse_fault_code(&response.body) == Some(PINGBACK_LIVE_FAULT) {
                return true;
            }
        }
        false
    }

    pub async fn wp_cron(&self) -> bool {
        self.fetch_ok(CRON_PATH).await.is_some()
    }

    pub async fn wp_login(&self) -> bool {
        for path in LOGIN_PATHS {
            if self.fetch_ok(path).await.is_some() {
                return true;
            }
        }
        false
    }

    pub async fn registration(&self) -> bool {
        for path in LOGIN_PATHS {
            let path = format!("{}?action=register", path);
            if let Some(fetched) = self.fetch_ok(&path).await
                && fetched.body.contains(REGISTER_TITLE)
                && REGISTER_EMAIL_MARKERS.iter().any(|m| fetched.body.contains(m))
            {
                return true;
            }
        }
        false
    }

    pub async fn config_leak(&self) -> bool {
        for path in CONFIG_PATHS {
            if let Some(fetched) = self.fetch_ok(path).await
                && CONFIG_MARKERS.iter().any(|m| fetched.body.contains(m))
            {
                debug!(path, "configuration file exposed");
                return true;
            }
        }
        false
    }

    pub async fn debug_log(&self) -> bool {
        for dir in DEBUG_LOG_DIRS {
            let path = format!("/{}/debug.log", dir);
            let Some(fetched) = self.fetch_ok(&path).await else {
                continue;
            };
            let plain = fetched
                .content_type()
                .is_some_and(|ct| ct.contains("octet-stream") || ct.contains("text/plain"));
            if plain && PHP_LOG_RE.is_match(&fetched.body) {
                return true;
            }
        }
        false
    }

    /// oEmbed proxy SSRF
    ///
    /// Not implemented: always reports "not exposed".
    // TODO: probe /wp-json/oembed/1.0/proxy with an out-of-band callback URL
    pub async fn oembed_ssrf(&self) -> bool {
        warn!("oEmbed SSRF check is not implemented; reporting not exposed");
        false
    }

    /// Display names published by the REST users endpoint
    pub async fn users(&self) -> Vec<String> {
        let Some(fetched) = self.fetch_ok(USERS_PATH).await else {
            return Vec::new();
        };
        if !fetched
            .content_type()
            .is_some_and(|ct| ct.contains("application/json"))
        {
            return Vec::new();
        }
        match serde_json::from_str::<serde_json::Value>(&fetched.body) {
            Ok(value) => user_names(&value),
            Err(e) => {
                debug!(error = %e, "users endpoint returned invalid JSON");
                Vec::new()
            }
        }
    }
}

/// Names from either a list of users or a single user object
fn user_names(value: &serde_json::Value) -> Vec<String> {
    let name = |user: &serde_json::Value| user.get("name")?.as_str().map(str::to_string);
    match value {
        serde_json::Value::Array(users) => users.iter().filter_map(name).collect(),
        serde_json::Value::Object(_) => name(value).into_iter().collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScanConfig;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const LIST_METHODS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<methodResponse><params><param><value><array><data>
  <value><string>system.multicall</string></value>
  <value><string>pingback.ping</string></value>
  <value><string>wp.getUsersBlogs</string></value>
</data></array></value></param></params></methodResponse>"#;

    fn fault(code: i64) -> String {
        format!(
            r#"<?xml version="1.0"?><methodResponse><fault><value><struct>
<member><name>faultCode</name><value><int>{}</int></value></member>
<member><name>faultString</name><value><string>x</string></value></member>
</struct></value></fault></methodResponse>"#,
            code
        )
    }

    async fn suite(server: &MockServer) -> ProbeSuite {
        let config = ScanConfig {
            allow_private: true,
            ..Default::default()
        };
        ProbeSuite::new(TargetClient::new(&server.uri(), &config).await.unwrap())
    }

    #[test]
    fn method_list_parsing() {
        assert_eq!(
            parse_method_list(LIST_METHODS),
            vec!["system.multicall", "pingback.ping", "wp.getUsersBlogs"]
        );
        assert!(parse_method_list(&fault(405)).is_empty());
        assert!(parse_method_list("<html>XML-RPC server accepts POST requests only.</html>").is_empty());
    }

    #[test]
    fn fault_code_parsing() {
        assert_eq!(parse_fault_code(&fault(0)), Some(0));
        assert_eq!(parse_fault_code(&fault(-32601)), Some(-32601));
        assert_eq!(parse_fault_code(LIST_METHODS), None);
    }

    #[test]
    fn user_name_shapes() {
        let list = json!([{ "id": 1, "name": "admin" }, { "id": 2, "name": "editor" }, { "id": 3 }]);
        assert_eq!(user_names(&list), vec!["admin", "editor"]);
        assert_eq!(user_names(&json!({ "id": 1, "name": "solo" })), vec!["solo"]);
        assert!(user_names(&json!({ "code": "rest_no_route" })).is_empty());
        assert!(user_names(&json!("nope")).is_empty());
    }

    #[tokio::test]
    async fn directory_listing_detected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(UPLOADS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("<title>Index of /wp-content/uploads</title>"))
            .mount(&server)
            .await;
        assert!(suite(&server).await.directory_listing().await);
    }

    #[tokio::test]
    async fn xmlrpc_pingback_exposed_on_live_fault() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(XMLRPC_PATH))
            .and(body_string_contains("system.listMethods"))
            .respond_with(ResponseTemplate::new(200).set_body_string(LIST_METHODS))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(XMLRPC_PATH))
            .and(body_string_contains("<methodName>pingback.ping</methodName>"))
            .respond_with(ResponseTemplate::new(200).set_body_string(fault(0)))
            .expect(1)
            .mount(&server)
            .await;
        assert!(suite(&server).await.xmlrpc().await);
    }

    #[tokio::test]
    async fn xmlrpc_other_fault_not_exposed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("system.listMethods"))
            .respond_with(ResponseTemplate::new(200).set_body_string(LIST_METHODS))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("pingback.ping"))
            .respond_with(ResponseTemplate::new(200).set_body_string(fault(405)))
            .mount(&server)
            .await;
        assert!(!suite(&server).await.xmlrpc().await);
    }

    #[tokio::test]
    async fn login_found_on_later_candidate() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wp-login.php"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        assert!(suite(&server).await.wp_login().await);
    }

    #[tokio::test]
    async fn registration_needs_markers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wp-login.php"))
            .and(query_param("action", "register"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<p>Register For This Site</p><label>Email</label>"),
            )
            .mount(&server)
            .await;
        assert!(suite(&server).await.registration().await);

        let closed = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("User registration is currently not allowed."))
            .mount(&closed)
            .await;
        assert!(!suite(&closed).await.registration().await);
    }

    #[tokio::test]
    async fn config_leak_detected_from_backup() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wp-config.php.bak"))
            .respond_with(ResponseTemplate::new(200).set_body_string("define( 'DB_NAME', 'prod' );"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        assert!(suite(&server).await.config_leak().await);
    }

    #[tokio::test]
    async fn config_leak_false_when_all_candidates_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("DB_PASSWORD"))
            .expect(CONFIG_PATHS.len() as u64)
            .mount(&server)
            .await;
        assert!(!suite(&server).await.config_leak().await);
    }

    #[tokio::test]
    async fn debug_log_requires_plain_content_and_php_lines() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wp-content/debug.log"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("[12-Mar-2024 10:15:01 UTC] PHP Notice: x", "text/html"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/blog/debug.log"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(
                    "[12-Mar-2024 10:15:01 UTC] PHP Warning: Undefined index",
                    "text/plain; charset=utf-8",
                ),
            )
            .mount(&server)
            .await;
        assert!(suite(&server).await.debug_log().await);
    }

    #[tokio::test]
    async fn users_from_rest_api() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(USERS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "name": "admin" }])))
            .mount(&server)
            .await;
        assert_eq!(suite(&server).await.users().await, vec!["admin"]);
    }

    #[tokio::test]
    async fn users_ignores_non_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(USERS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"[{"name":"admin"}]"#))
            .mount(&server)
            .await;
        assert!(suite(&server).await.users().await.is_empty());
    }

    #[tokio::test]
    async fn every_probe_fails_closed_when_unreachable() {
        let config = ScanConfig {
            allow_private: true,
            ..Default::default()
        };
        let suite = ProbeSuite::new(TargetClient::new("http://127.0.0.1:9", &config).await.unwrap());
        for exposure in ProbeSuite::ORDER {
            assert!(!suite.check(exposure).await, "{exposure}");
        }
        assert!(suite.users().await.is_empty());
    }
}
