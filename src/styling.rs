use once_cell::sync::Lazy;
use crossterm::style::{Color, Stylize};

pub static STYLER: Lazy<Styler> = Lazy::new(Styler::new);

pub struct Styler {
    success: Color,
    warning: Color,
    info: Color,
    dim_gray: Color,
    prompt: Color,
    separator: Color,
    header: Color,
    user: Color,
    assistant: Color,
}

impl Styler {
    fn new() -> Self {
        Self {
            success: Color::Green,
            warning: Color::Yellow,
            info: Color::Blue,
            dim_gray: Color::DarkGrey,
            prompt: Color::Magenta,
            separator: Color::DarkGrey,
            header: Color::Blue,
            user: Color::Cyan,
            assistant: Color::Green,
        }
    }

    /// Base style function that applies a color to text.
    /// output:
    /// [color]text[reset]
    pub fn style_text<'a, D: std::fmt::Display>(&self, text: D, color: Color) -> impl std::fmt::Display + 'a {
        text.to_string().with(color)
    }

    pub fn success_style<'a, D: std::fmt::Display>(&self, text: D) -> impl std::fmt::Display + 'a {
        self.style_text(text, self.success)
    }

    /// Notices appended to the conversation (rate limits, lost connection).
    /// output:
    /// [yellow]text[reset]
    pub fn warning_style<'a, D: std::fmt::Display>(&self, text: D) -> impl std::fmt::Display + 'a {
        self.style_text(text, self.warning)
    }

    pub fn info_style<'a, D: std::fmt::Display>(&self, text: D) -> impl std::fmt::Display + 'a {
        self.style_text(text, self.info)
    }

    /// Reasoning text and other secondary output.
    /// output:
    /// [dark grey dim]text[reset]
    pub fn dim_gray_style<'a, D: std::fmt::Display>(&self, text: D) -> impl std::fmt::Display + 'a {
        text.to_string().with(self.dim_gray).dim()
    }

    pub fn prompt_style<'a, D: std::fmt::Display>(&self, text: D) -> impl std::fmt::Display + 'a {
        self.style_text(text, self.prompt)
    }

    pub fn separator_style<'a, D: std::fmt::Display>(&self, text: D) -> impl std::fmt::Display + 'a {
        self.style_text(text, self.separator)
    }

    /// output:
    /// [blue bold]text[reset]
    pub fn header_style<'a, D: std::fmt::Display>(&self, text: D) -> impl std::fmt::Display + 'a {
        text.to_string().with(self.header).bold()
    }

    /// Role label for user turns.
    pub fn user_style<'a, D: std::fmt::Display>(&self, text: D) -> impl std::fmt::Display + 'a {
        text.to_string().with(self.user).bold()
    }

    /// Role label for assistant turns.
    pub fn assistant_style<'a, D: std::fmt::Display>(&self, text: D) -> impl std::fmt::Display + 'a {
        text.to_string().with(self.assistant).bold()
    }
}
