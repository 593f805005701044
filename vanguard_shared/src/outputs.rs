//! Scripted entity outputs.
//!
//! Level data links entities with delimited strings of the form
//! `"target,Component.Input,delay[,parameter]"`, several entries separated by
//! semicolons. Parsed entries are kept sorted ascending by fire delay.

/// One scripted output link.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityOutputEntry {
    /// Targetname of the receiving entity.
    pub target: String,
    /// Named input to fire, e.g. `"Door.Open"`.
    pub input: String,
    /// Seconds between the output firing and the input being delivered.
    pub delay: f32,
    /// Optional parameter passed through to the input.
    pub parameter: Option<String>,
}

impl EntityOutputEntry {
    /// Parses one `"target,Component.Input,delay[,parameter]"` entry.
    /// Returns `None` for malformed entries.
    pub fn parse(s: &str) -> Option<Self> {
        let mut fields = s.split(',').map(str::trim);
        let target = fields.next()?.to_string();
        let input = fields.next()?.to_string();
        let delay = fields.next()?.parse::<f32>().ok()?;
        if target.is_empty() || input.is_empty() || delay < 0.0 {
            return None;
        }
        let parameter = fields.next().map(|p| p.to_string()).filter(|p| !p.is_empty());
        Some(Self {
            target,
            input,
            delay,
            parameter,
        })
    }

    /// Parses a semicolon-separated list of entries, dropping malformed ones
    /// and re-sorting ascending by delay.
    pub fn parse_outputs(s: &str) -> Vec<Self> {
        let mut entries: Vec<Self> = s
            .split(';')
            .filter(|part| !part.trim().is_empty())
            .filter_map(Self::parse)
            .collect();
        entries.sort_by(|a, b| a.delay.total_cmp(&b.delay));
        entries
    }
}
