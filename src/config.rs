// ── Branding ─────────────────────────────────────────────────────────────────

pub const COMPANY_NAME: &str = "RE/MAX Oceanus";
pub const DECK_TITLE: &str = "Imóveis selecionados";
/// Accent color as `RRGGBB`.
pub const ACCENT_COLOR: &str = "003DA5";

// ── Extraction ───────────────────────────────────────────────────────────────

pub const MAX_IMAGES: usize = 3;
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36";
pub const CONNECT_TIMEOUT_SECS: u64 = 10;
pub const REQUEST_TIMEOUT_SECS: u64 = 45;
pub const INSECURE_SSL_ENV: &str = "IMOVIRTUAL_DECK_INSECURE_SSL";

// ── Files ────────────────────────────────────────────────────────────────────

pub const DEFAULT_INPUT: &str = "links.csv";
pub const DEFAULT_CSV_OUT: &str = "imoveis.csv";
pub const DEFAULT_PPTX_OUT: &str = "imoveis.pptx";

// ── Slides ───────────────────────────────────────────────────────────────────

/// Longest description shown on a slide, in characters.
pub const DESCRIPTION_MAX_CHARS: usize = 700;
