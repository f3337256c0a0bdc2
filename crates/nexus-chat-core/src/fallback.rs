use rand::Rng;

/// Picks an index in `0..len`
pub type ChoiceFn = Box<dyn Fn(usize) -> usize + Send + Sync>;

pub const DEFAULT_FALLBACK_RESPONSES: [&str; 3] = [
    "Sorry, I can't reach the server right now. Please try again later.",
    "Looks like the connection dropped. Check your network or contact support.",
    "The backend is under maintenance. Try again in a few minutes.",
];

/// Static apology lines shown when the chat endpoint cannot answer
pub struct FallbackResponses {
    lines: Vec<String>,
    choose: ChoiceFn,
}

impl FallbackResponses {
    /// Uniformly random choice. Falls back to the built-in lines when
    /// `lines` is empty.
    pub fn random(lines: Vec<String>) -> Self {
        Self::with_choice(lines, Box::new(|len| rand::thread_rng().gen_range(0..len)))
    }

    /// Always the line at `index` (wrapped to the list length)
    pub fn fixed(lines: Vec<String>, index: usize) -> Self {
        Self::with_choice(lines, Box::new(move |_| index))
    }

    pub fn with_choice(lines: Vec<String>, choose: ChoiceFn) -> Self {
        let lines = if lines.is_empty() {
            DEFAULT_FALLBACK_RESPONSES.iter().map(|s| s.to_string()).collect()
        } else {
            lines
        };

        Self { lines, choose }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn pick(&self) -> &str {
        let index = (self.choose)(self.lines.len()) % self.lines.len();
        &self.lines[index]
    }
}

impl Default for FallbackResponses {
    fn default() -> Self {
        Self::random(Vec::new())
    }
}
