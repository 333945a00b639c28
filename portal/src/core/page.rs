//! Regions of the portal entry page and the distribution rewrite.
//!
//! Regions are located by regex. Call sites that need a region to exist use
//! [`locate`], which insists on exactly one match; the distribution rewrite
//! tolerates absent markers because not every page variant carries all of them.

use std::fmt;
use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

use crate::core::errors::ExtractError;
use crate::core::rewrite::replace_first;

/// Independently-addressed regions of the entry page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    /// `var bootstrap = {...}` statement.
    BootstrapStatement,
    /// `<script id="bootstrap">...</script>` tag.
    BootstrapScript,
    /// `<script src="config.js"></script>` tag.
    LoaderConfigScript,
    /// `<script id="socket.io_load">...</script>` tag.
    SocketLoaderScript,
    /// `var domain = 'localhost'`.
    DomainVariable,
    /// `var port = ':3000'`.
    PortVariable,
    /// `var schema = 'http://'`.
    SchemeVariable,
}

impl Region {
    pub fn pattern(self) -> &'static Regex {
        match self {
            Region::BootstrapStatement => &BOOTSTRAP_STATEMENT,
            Region::BootstrapScript => &BOOTSTRAP_SCRIPT,
            Region::LoaderConfigScript => &LOADER_CONFIG_SCRIPT,
            Region::SocketLoaderScript => &SOCKET_LOADER_SCRIPT,
            Region::DomainVariable => &DOMAIN_VARIABLE,
            Region::PortVariable => &PORT_VARIABLE,
            Region::SchemeVariable => &SCHEME_VARIABLE,
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Region::BootstrapStatement => "bootstrap-statement",
            Region::BootstrapScript => "bootstrap-script",
            Region::LoaderConfigScript => "loader-config-script",
            Region::SocketLoaderScript => "socket-loader-script",
            Region::DomainVariable => "domain-variable",
            Region::PortVariable => "port-variable",
            Region::SchemeVariable => "scheme-variable",
        };
        f.write_str(name)
    }
}

static BOOTSTRAP_STATEMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)var\s*bootstrap\s*=\s*\{.*\}").expect("valid pattern"));
static BOOTSTRAP_SCRIPT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<script id=['"]bootstrap['"]>[\s\S]*?</script>"#).expect("valid pattern")
});
static LOADER_CONFIG_SCRIPT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<script src=['"]config\.js['"]>[\s\S]*?</script>"#).expect("valid pattern")
});
static SOCKET_LOADER_SCRIPT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<script id=['"]socket\.io_load['"]>[\s\S]*?</script>"#)
        .expect("valid pattern")
});
static DOMAIN_VARIABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"var domain\s*=\s*'localhost'").expect("valid pattern"));
static PORT_VARIABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"var port\s*=\s*':3000'").expect("valid pattern"));
static SERVER_LISTEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)server\.listen\(([^)]*)\)").expect("valid pattern"));
static PORT_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,5})\b").expect("valid pattern"));
static SCHEME_VARIABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"var schema\s*=\s*'http://'").expect("valid pattern"));

/// Loader bootstrap used by the distribution page: import the dependency bundle,
/// then the app bundle, with a normalizer that leaves relative module ids alone.
pub const DIST_LOADER_SCRIPT: &str = "let normalizeFn = System.normalize; \n\
\tlet customNormalize = function (name, parentName) { \n\
\t\tif ((name[0] != '.' || (!!name[1] && name[1] != '/' && name[1] != '.')) && name[0] != '/' && !name.match(System.absURLRegEx)) \n\
\t\t\treturn normalizeFn(name, parentName) \n\
\t\treturn name \n\
\t} \n\
\tSystem.normalize = customNormalize; \n\
\tSystem.import(dependencies).then(function () { \n\
\t\tSystem.normalize = customNormalize; \n \
\t\tSystem.import(app).then(function () { \n\
\t\tSystem.import('app'); \n\
\t\t}); \n\
\t\tSystem.normalize = normalizeFn; \n\
\t}); \n\
\tSystem.normalize = normalizeFn; \n";

/// Locate a region that must occur exactly once.
pub fn locate(page: &str, region: Region) -> Result<Range<usize>, ExtractError> {
    let mut matches = region.pattern().find_iter(page);
    let first = matches.next().ok_or(ExtractError::RegionMissing { region })?;
    let extra = matches.count();
    if extra > 0 {
        return Err(ExtractError::RegionAmbiguous {
            region,
            count: extra + 1,
        });
    }
    Ok(first.range())
}

/// Discover the dev server port from its `server.listen(...)` call.
///
/// The last integer literal inside the call wins, so `server.listen(process.env.PORT || 3000)`
/// yields 3000.
pub fn server_listen_port(server_script: &str) -> Result<u16, ExtractError> {
    let args = SERVER_LISTEN
        .captures(server_script)
        .and_then(|caps| caps.get(1))
        .ok_or(ExtractError::ServerPortNotFound)?;
    PORT_NUMBER
        .captures_iter(args.as_str())
        .filter_map(|caps| caps[1].parse::<u16>().ok())
        .last()
        .ok_or(ExtractError::ServerPortNotFound)
}

/// Rewrite a development page into its distribution form.
///
/// Blanks the bootstrap script, the dev domain and port, forces the secure
/// scheme, inlines the loader config and swaps in the bundle loader script.
/// Each region is rewritten at its first occurrence only.
pub fn rewrite_for_distribution(page: &str, loader_config_json: &str) -> String {
    let replacements = [
        (Region::BootstrapScript, "<script>var bootstrap= {}</script>".to_string()),
        (Region::DomainVariable, "var domain = ''".to_string()),
        (Region::PortVariable, "var port = ''".to_string()),
        (Region::SchemeVariable, "var schema = 'https://'".to_string()),
        (
            Region::LoaderConfigScript,
            format!("<script>System.config({loader_config_json});</script>"),
        ),
        (
            Region::SocketLoaderScript,
            format!("<script>{DIST_LOADER_SCRIPT}</script>"),
        ),
    ];

    let mut out = page.to_string();
    for (region, replacement) in &replacements {
        out = replace_first(&out, region.pattern(), replacement).into_owned();
    }
    out
}
