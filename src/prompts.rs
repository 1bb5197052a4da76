use clap::ValueEnum;

/// Built-in system prompts selectable with `--preset`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Preset {
    #[default]
    Default,
    Creative,
    Concise,
    Code,
}

impl Preset {
    pub fn system_prompt(&self) -> &'static str {
        match self {
            Self::Default => "You are a helpful assistant. Provide clear, direct & short responses.",
            Self::Creative => {
                "You are a creative assistant. Generate imaginative and engaging responses."
            }
            Self::Concise => {
                "You are a precise assistant. Provide brief, direct answers without elaboration."
            }
            Self::Code => {
                "You are a coding assistant. Focus on providing clean, well-documented code examples."
            }
        }
    }
}

/// An explicit `--system` prompt wins over the preset.
pub fn resolve_system_prompt(explicit: Option<&str>, preset: Preset) -> String {
    match explicit.map(str::trim).filter(|prompt| !prompt.is_empty()) {
        Some(prompt) => prompt.to_string(),
        None => preset.system_prompt().to_string(),
    }
}
