//! # Assembly Writer & BASIC Stub (C8, §4.8)
//!
//! A structured line-buffer writer for ACME-syntax 6502 assembly: section
//! tracking, column alignment for labels/instructions/comments, and the
//! handful of primitive emission operations spec.md names. `CodeGenerator`
//! (C9, `select.rs`) is the only consumer.

/// The section an emitted line belongs to (§4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    /// File-level banner/license-style header comments.
    Header,
    /// Target/build configuration comments (e.g. assembler directives).
    Config,
    /// The optional BASIC autostart stub.
    Basic,
    /// Function bodies.
    Code,
    /// Global data and reservations.
    Data,
    /// Trailing comments/padding.
    Footer,
}

impl Section {
    fn banner_text(self) -> &'static str {
        match self {
            Section::Header => "Header",
            Section::Config => "Configuration",
            Section::Basic => "BASIC Stub",
            Section::Code => "Code",
            Section::Data => "Data",
            Section::Footer => "Footer",
        }
    }
}

/// Configuration for the optional BASIC `10 SYS <addr>` autostart line
/// (§4.8, §6 "Memory-map conventions").
#[derive(Debug, Clone, Copy)]
pub struct BasicStubConfig {
    /// Address the stub itself is assembled at (`$0801` on C64).
    pub load_address: u16,
    /// Address the `SYS` token jumps to — where real code begins.
    pub code_start: u16,
    /// The BASIC line number the stub uses (`10` by convention).
    pub line_number: u16,
}

impl BasicStubConfig {
    /// The standard C64 stub: loaded at `$0801`, `SYS`s to `$0810`.
    pub fn c64_default(code_start: u16) -> Self {
        Self {
            load_address: 0x0801,
            code_start,
            line_number: 10,
        }
    }
}

const COMMENT_COLUMN: usize = 30;

fn hex_byte(v: u8) -> String {
    format!("${v:02X}")
}

fn hex_word(v: u16) -> String {
    format!("${v:04X}")
}

/// Pad `line` with spaces until it reaches `COMMENT_COLUMN`, then append the
/// comment. If `line` already exceeds that column, a single space separates
/// it from the comment instead of truncating anything (§4.8: "right-aligned
/// by padding to column 30").
fn with_comment(mut line: String, comment: &str) -> String {
    if line.len() < COMMENT_COLUMN {
        line.push_str(&" ".repeat(COMMENT_COLUMN - line.len()));
    } else {
        line.push(' ');
    }
    line.push_str("; ");
    line.push_str(comment);
    line
}

/// A structured, ordered line buffer for ACME-syntax assembly (§4.8).
#[derive(Debug, Clone, Default)]
pub struct AsmWriter {
    lines: Vec<String>,
    section: Option<Section>,
}

impl AsmWriter {
    /// An empty writer positioned before any section.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current section, if one has been set.
    pub fn section(&self) -> Option<Section> {
        self.section
    }

    /// Move to a new section, emitting a banner comment if the section
    /// actually changed.
    pub fn set_section(&mut self, section: Section) {
        if self.section != Some(section) {
            self.section = Some(section);
            self.section_banner(section.banner_text());
        }
    }

    /// A `; --- <title> ---` banner comment line.
    pub fn section_banner(&mut self, title: &str) {
        self.lines.push(format!("; --- {title} ---"));
    }

    /// `* = $HHHH` origin directive.
    pub fn origin(&mut self, addr: u16) {
        self.lines.push(format!("* = {}", hex_word(addr)));
    }

    /// A top-level label, column 0, e.g. `_main:`.
    pub fn label(&mut self, name: &str) {
        self.lines.push(format!("{name}:"));
    }

    /// A local (block-scoped) label, e.g. `.block_if_then_0:`.
    pub fn local_label(&mut self, name: &str) {
        self.lines.push(format!(".{name}:"));
    }

    /// One instruction line: two-space indent, optional operand, optional
    /// right-aligned comment.
    pub fn instruction(&mut self, mnemonic: &str, operand: Option<&str>, comment: Option<&str>) {
        let mut line = match operand {
            Some(op) => format!("  {mnemonic} {op}"),
            None => format!("  {mnemonic}"),
        };
        if let Some(c) = comment {
            line = with_comment(line, c);
        }
        self.lines.push(line);
    }

    /// A raw comment line (no leading `;` expected from the caller).
    pub fn comment_line(&mut self, text: &str) {
        self.lines.push(format!("; {text}"));
    }

    /// A blank line, used to separate functions/globals visually.
    pub fn blank_line(&mut self) {
        self.lines.push(String::new());
    }

    /// `!byte $xx, $xx, ...`
    pub fn byte_data(&mut self, values: &[u8]) {
        if values.is_empty() {
            return;
        }
        let rendered: Vec<String> = values.iter().map(|v| hex_byte(*v)).collect();
        self.lines.push(format!("  !byte {}", rendered.join(", ")));
    }

    /// `!word $xxxx, $xxxx, ...`
    pub fn word_data(&mut self, values: &[u16]) {
        if values.is_empty() {
            return;
        }
        let rendered: Vec<String> = values.iter().map(|v| hex_word(*v)).collect();
        self.lines.push(format!("  !word {}", rendered.join(", ")));
    }

    /// `!text "..."`
    pub fn text_data(&mut self, s: &str) {
        self.lines.push(format!("  !text \"{s}\""));
    }

    /// `!fill count, value` — reserve `count` bytes filled with `value`.
    pub fn fill(&mut self, count: u32, value: u8) {
        self.lines.push(format!("  !fill {count}, {}", hex_byte(value)));
    }

    /// Emit the BASIC autostart stub at `cfg.load_address`, then advance the
    /// origin to `cfg.code_start` (§4.8). This is the sequence a C64 BASIC
    /// line `<line_number> SYS <code_start>` assembles to: a next-line
    /// pointer, the line number (little-endian), the `SYS` token `$9E`, the
    /// target address rendered as decimal ASCII, a `$00` line terminator,
    /// then `$00 $00` to end the BASIC program.
    pub fn basic_stub(&mut self, cfg: &BasicStubConfig) {
        self.set_section(Section::Basic);
        self.origin(cfg.load_address);

        let digits = cfg.code_start.to_string();
        // next_line_ptr + line_number (2 bytes each) + SYS token (1) +
        // ASCII digits + line terminator (1).
        let line_len = 2 + 2 + 1 + digits.len() as u16 + 1;
        let next_line_ptr = cfg.load_address.wrapping_add(line_len);

        self.word_data(&[next_line_ptr]);
        self.word_data(&[cfg.line_number]);
        self.byte_data(&[0x9E]);
        self.byte_data(&digits.bytes().collect::<Vec<u8>>());
        self.byte_data(&[0x00]);
        self.byte_data(&[0x00, 0x00]);

        self.set_section(Section::Code);
        self.origin(cfg.code_start);
    }

    /// The number of lines emitted so far (1-based line numbers for the
    /// source map are `line_count() + 1` *before* the next push, or callers
    /// can snapshot `line_count()` then push and use the snapshot as the
    /// line number of what they just wrote).
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Consume the writer, returning the assembled text with a trailing
    /// newline, one line per entry.
    pub fn finish(self) -> String {
        let mut out = self.lines.join("\n");
        out.push('\n');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_stub_layout_matches_standard_c64_encoding() {
        let mut w = AsmWriter::new();
        w.basic_stub(&BasicStubConfig::c64_default(0x0810));
        let text = w.finish();
        assert!(text.contains("* = $0801"));
        assert!(text.contains("!byte $9E"));
        // "2064" is $0810 in decimal.
        assert!(text.contains("!byte $32, $30, $36, $34"));
        assert!(text.contains("* = $0810"));
    }

    #[test]
    fn instruction_comment_is_padded_to_column_30() {
        let mut w = AsmWriter::new();
        w.instruction("LDA", Some("#$01"), Some("load value"));
        let text = w.finish();
        let line = text.lines().next().unwrap();
        let comment_pos = line.find(';').unwrap();
        assert_eq!(comment_pos, 30);
    }

    #[test]
    fn section_change_emits_a_single_banner() {
        let mut w = AsmWriter::new();
        w.set_section(Section::Code);
        w.set_section(Section::Code);
        w.set_section(Section::Data);
        let text = w.finish();
        assert_eq!(text.matches("---").count(), 4);
    }
}
