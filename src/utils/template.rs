//! `{{name}}` placeholder substitution for download URLs and config files.
//! Placeholders with no value are left as they are.

/// Placeholder names shared by the nginx and python installers.
pub struct TemplateVars;

impl TemplateVars {
    pub const VERSION: &'static str = "version";
    pub const NGINX_BIN: &'static str = "nginx_bin";
    pub const NGINX_PID: &'static str = "nginx_pid";
    pub const NGINX_USER: &'static str = "nginx_user";
}

pub fn render(template: &str, variables: &[(&str, &str)]) -> String {
    variables
        .iter()
        .fold(template.to_string(), |text, (name, value)| {
            text.replace(&format!("{{{{{}}}}}", name), value)
        })
}
