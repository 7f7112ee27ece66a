use serde::Deserialize;

use crate::services::scheduler::SchedulingPolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "127.0.0.1:3000"). Unused by the worker CLI.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Gemini API key
    pub gemini_api_key: String,

    /// Image-capable Gemini model name
    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,

    /// Gemini REST base URL (overridable for local mocks)
    #[serde(default = "default_gemini_base_url")]
    pub gemini_base_url: String,

    /// Instruction sent alongside every image
    #[serde(default = "default_removal_prompt")]
    pub removal_prompt: String,

    /// `manual` or `sequential`
    #[serde(default)]
    pub scheduling_policy: SchedulingPolicy,

    /// Prefix prepended to the original file name on download
    #[serde(default = "default_download_prefix")]
    pub download_prefix: String,

    /// User-facing message recorded on a job when removal fails
    #[serde(default = "default_failure_message")]
    pub failure_message: String,

    /// Upper bound for a single multipart upload request
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_bind_addr() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_gemini_model() -> String {
    "gemini-2.5-flash-image".to_string()
}

fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_removal_prompt() -> String {
    concat!(
        "Remove the watermark from this image. ",
        "Preserve every other detail and the original image quality. ",
        "Return only the edited image, without any additional text."
    )
    .to_string()
}

fn default_download_prefix() -> String {
    "no_watermark_".to_string()
}

fn default_failure_message() -> String {
    "Failed to process image.".to_string()
}

fn default_max_upload_bytes() -> usize {
    25 * 1024 * 1024
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Build from explicit key/value pairs instead of the process environment.
    pub fn from_iter<I>(vars: I) -> Result<Self, envy::Error>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        envy::from_iter(vars)
    }
}
