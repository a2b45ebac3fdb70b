// Pastel color palette for terminal reports

use crossterm::style::{Color, StyledContent, Stylize};

/// Defines the pastel color palette
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PastelColor {
    Pink,
    Lavender,
    Mint,
    SkyBlue,
    Peach,
    Gray,
}

impl PastelColor {
    /// Get the terminal color representation
    pub fn as_color(&self) -> Color {
        match self {
            PastelColor::Pink => Color::Rgb { r: 255, g: 182, b: 193 },
            PastelColor::Lavender => Color::Rgb { r: 204, g: 169, b: 221 },
            PastelColor::Mint => Color::Rgb { r: 176, g: 224, b: 183 },
            PastelColor::SkyBlue => Color::Rgb { r: 173, g: 216, b: 230 },
            PastelColor::Peach => Color::Rgb { r: 255, g: 218, b: 185 },
            PastelColor::Gray => Color::Rgb { r: 169, g: 169, b: 169 },
        }
    }
}

/// Colors used by each kind of report line
#[derive(Clone, Copy, Debug)]
pub struct Theme {
    pub heading: PastelColor,
    pub resource: PastelColor,
    pub detail: PastelColor,
    pub success: PastelColor,
    pub warning: PastelColor,
    pub error: PastelColor,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            heading: PastelColor::Lavender,
            resource: PastelColor::Pink,
            detail: PastelColor::SkyBlue,
            success: PastelColor::Mint,
            warning: PastelColor::Peach,
            error: PastelColor::Pink,
        }
    }
}

/// Text that is either colored or left plain, decided once per report
#[derive(Clone, Copy, Debug)]
pub struct Painter {
    theme: Theme,
    enabled: bool,
}

impl Painter {
    pub fn new(theme: Theme, enabled: bool) -> Self {
        Self { theme, enabled }
    }

    /// Painter that never emits escape codes
    pub fn plain() -> Self {
        Self::new(Theme::default(), false)
    }

    pub fn theme(&self) -> &Theme {
        &self.theme
    }

    pub fn paint(&self, text: &str, color: PastelColor) -> String {
        if self.enabled {
            text.with(color.as_color()).to_string()
        } else {
            text.to_string()
        }
    }

    pub fn bold(&self, text: &str, color: PastelColor) -> String {
        if self.enabled {
            let styled: StyledContent<&str> = text.with(color.as_color()).bold();
            styled.to_string()
        } else {
            text.to_string()
        }
    }
}
