// Defaults for the model endpoint, storage, and the study protocol.
// The command line (and its environment fallbacks) override all of these.

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const CHAT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

pub const GCS_BUCKET: &str = "streamlit-bucket-bot-eval";
pub const STORAGE_API_BASE: &str = "https://storage.googleapis.com";
pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
pub const STORAGE_SCOPE: &str = "https://www.googleapis.com/auth/devstorage.read_write";

/// Completed turns before the transcript is uploaded and the save button shows.
pub const DEFAULT_MIN_TURNS: usize = 5;

pub const GREETING: &str = "Hello, I am an AI therapist, here to support you in navigating the challenges and emotions you may face as a caregiver. \
Is there a specific caregiving challenge or experience you would like to share with me today?";
