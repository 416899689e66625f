use std::path::PathBuf;

/// One part of a structured turn input.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UserInput {
    /// Prompt text.
    Text { text: String },
    /// Image on the local filesystem, forwarded as `--image <path>`.
    LocalImage { path: PathBuf },
}

impl UserInput {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn local_image(path: impl Into<PathBuf>) -> Self {
        Self::LocalImage { path: path.into() }
    }
}

/// Input accepted by `run` and `run_streamed`: a plain prompt or a list of parts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Input {
    Text(String),
    Parts(Vec<UserInput>),
}

impl From<&str> for Input {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Input {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<UserInput>> for Input {
    fn from(value: Vec<UserInput>) -> Self {
        Self::Parts(value)
    }
}

/// Prompt text and image paths extracted from an [`Input`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct NormalizedInput {
    pub prompt: String,
    pub images: Vec<PathBuf>,
}

impl Input {
    /// Joins text parts with a blank line and collects images in order.
    pub(crate) fn normalize(self) -> NormalizedInput {
        match self {
            Input::Text(prompt) => NormalizedInput {
                prompt,
                images: Vec::new(),
            },
            Input::Parts(parts) => {
                let mut texts = Vec::new();
                let mut images = Vec::new();
                for part in parts {
                    match part {
                        UserInput::Text { text } => texts.push(text),
                        UserInput::LocalImage { path } => images.push(path),
                    }
                }
                NormalizedInput {
                    prompt: texts.join("\n\n"),
                    images,
                }
            }
        }
    }
}
