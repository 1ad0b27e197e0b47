//! Shared UI icons and emojis.
//!
//! Each icon carries a plain-text fallback for terminals without emoji support.

use console::Emoji;

// Status indicators
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "*");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "[SKIP]");

// Progress indicators
pub static RETRY: Emoji<'_, '_> = Emoji("🔄 ", "[RETRY]");
pub static RUNNING: Emoji<'_, '_> = Emoji("▶️  ", "[>]");
pub static ARCHIVE: Emoji<'_, '_> = Emoji("📦 ", "[ARCHIVE]");
pub static FOLDER: Emoji<'_, '_> = Emoji("📁 ", "");
