//! Colors, spacing and widget styles for the picker window.
//!
//! Everything visual goes through these helpers so the grid, header and
//! banner keep the same look.

use iced::theme;
use iced::widget::{button, container};
use iced::{Background, Border, Color, Theme};

pub struct Palette;

impl Palette {
    pub const PRIMARY: Color = Color { r: 0.76, g: 0.21, b: 0.52, a: 1.0 };
    pub const ON_PRIMARY: Color = Color::WHITE;
    pub const SURFACE: Color = Color { r: 0.98, g: 0.98, b: 0.98, a: 1.0 };
    pub const ON_SURFACE: Color = Color { r: 0.1, g: 0.1, b: 0.1, a: 1.0 };
    pub const ERROR: Color = Color { r: 0.80, g: 0.0, b: 0.0, a: 1.0 };

    pub const SPACING: u16 = 16;
    pub const TILE_SIZE: f32 = 150.0;
    pub const TILE_GAP: u16 = 8;
}

struct PrimaryButton;

impl button::StyleSheet for PrimaryButton {
    type Style = Theme;

    fn active(&self, _style: &Self::Style) -> button::Appearance {
        button::Appearance {
            background: Some(Background::Color(Palette::PRIMARY)),
            text_color: Palette::ON_PRIMARY,
            border: Border {
                color: Palette::PRIMARY,
                width: 0.0,
                radius: 4.0.into(),
            },
            ..Default::default()
        }
    }

    fn disabled(&self, style: &Self::Style) -> button::Appearance {
        let active = self.active(style);
        button::Appearance {
            background: Some(Background::Color(Color { a: 0.4, ..Palette::PRIMARY })),
            ..active
        }
    }
}

/// Grid tile; a selected tile gets a thick primary border.
struct Tile {
    selected: bool,
}

impl button::StyleSheet for Tile {
    type Style = Theme;

    fn active(&self, _style: &Self::Style) -> button::Appearance {
        button::Appearance {
            background: Some(Background::Color(if self.selected {
                Palette::PRIMARY
            } else {
                Palette::SURFACE
            })),
            text_color: Palette::ON_SURFACE,
            border: Border {
                color: if self.selected { Palette::PRIMARY } else { Color::TRANSPARENT },
                width: if self.selected { 4.0 } else { 0.0 },
                radius: 2.0.into(),
            },
            ..Default::default()
        }
    }

    fn hovered(&self, style: &Self::Style) -> button::Appearance {
        let active = self.active(style);
        if self.selected {
            return active;
        }
        button::Appearance {
            border: Border {
                color: Color { a: 0.5, ..Palette::PRIMARY },
                width: 2.0,
                radius: 2.0.into(),
            },
            ..active
        }
    }
}

struct Banner;

impl container::StyleSheet for Banner {
    type Style = Theme;

    fn appearance(&self, _style: &Self::Style) -> container::Appearance {
        container::Appearance {
            text_color: Some(Palette::ON_PRIMARY),
            background: Some(Background::Color(Palette::ERROR)),
            border: Border {
                color: Palette::ERROR,
                width: 1.0,
                radius: 2.0.into(),
            },
            ..Default::default()
        }
    }
}

pub fn button_primary() -> theme::Button {
    theme::Button::Custom(Box::new(PrimaryButton))
}

pub fn tile(selected: bool) -> theme::Button {
    theme::Button::Custom(Box::new(Tile { selected }))
}

pub fn error_banner() -> theme::Container {
    theme::Container::Custom(Box::new(Banner))
}
