//! Color transform node
//!
//! Accepted inputs: `#rgb`, `#rrggbb`, `#rrggbbaa`, `r,g,b` and `r,g,b,a`
//! (channels 0–255, alpha 0–1). Output is rendered in one of the
//! [`ColorSpace`]s after an optional [`Modification`].

use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use super::{checked_clone, Evaluate, Fallback, NodeKind, NodeRef};
use crate::context::CloneContext;
use crate::error::{CloneError, EvalError};
use crate::value::{format_float, Value};

/// An RGBA color with channels in `0..=1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    /// Red
    pub r: f64,
    /// Green
    pub g: f64,
    /// Blue
    pub b: f64,
    /// Alpha
    pub a: f64,
}

impl Rgba {
    /// Parse any accepted color notation.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        match text.strip_prefix('#') {
            Some(hex) => Self::parse_hex(hex),
            None => Self::parse_components(text),
        }
    }

    fn parse_hex(hex: &str) -> Option<Self> {
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let channel = |s: &str| u8::from_str_radix(s, 16).ok().map(|v| v as f64 / 255.0);
        match hex.len() {
            3 => {
                let mut it = hex.chars().map(|c| {
                    let pair = format!("{c}{c}");
                    channel(&pair)
                });
                Some(Self {
                    r: it.next()??,
                    g: it.next()??,
                    b: it.next()??,
                    a: 1.0,
                })
            }
            6 | 8 => Some(Self {
                r: channel(&hex[0..2])?,
                g: channel(&hex[2..4])?,
                b: channel(&hex[4..6])?,
                a: if hex.len() == 8 {
                    channel(&hex[6..8])?
                } else {
                    1.0
                },
            }),
            _ => None,
        }
    }

    fn parse_components(text: &str) -> Option<Self> {
        let parts: Vec<&str> = text.split(',').map(str::trim).collect();
        let channel = |s: &str| s.parse::<u8>().ok().map(|v| v as f64 / 255.0);
        match parts.as_slice() {
            [r, g, b] => Some(Self {
                r: channel(r)?,
                g: channel(g)?,
                b: channel(b)?,
                a: 1.0,
            }),
            [r, g, b, a] => Some(Self {
                r: channel(r)?,
                g: channel(g)?,
                b: channel(b)?,
                a: a.parse::<f64>().ok().filter(|a| (0.0..=1.0).contains(a))?,
            }),
            _ => None,
        }
    }

    fn map_rgb(self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            r: f(self.r).clamp(0.0, 1.0),
            g: f(self.g).clamp(0.0, 1.0),
            b: f(self.b).clamp(0.0, 1.0),
            a: self.a,
        }
    }

    fn byte(channel: f64) -> u8 {
        (channel * 255.0).round() as u8
    }

    /// Render in the given color space.
    pub fn render(&self, space: ColorSpace) -> String {
        let (r, g, b) = (Self::byte(self.r), Self::byte(self.g), Self::byte(self.b));
        match space {
            ColorSpace::Hex if self.a >= 1.0 => format!("#{:02x}{:02x}{:02x}", r, g, b),
            ColorSpace::Hex => format!("#{:02x}{:02x}{:02x}{:02x}", r, g, b, Self::byte(self.a)),
            ColorSpace::Rgb => format!("{},{},{}", r, g, b),
            ColorSpace::Rgba => format!("{},{},{},{}", r, g, b, format_float(self.a)),
        }
    }
}

/// Output notation of a [`Color`] node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorSpace {
    /// `#rrggbb`, or `#rrggbbaa` when not opaque
    #[default]
    Hex,
    /// `r,g,b`
    Rgb,
    /// `r,g,b,a`
    Rgba,
}

impl FromStr for ColorSpace {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hex" => Ok(ColorSpace::Hex),
            "rgb" => Ok(ColorSpace::Rgb),
            "rgba" => Ok(ColorSpace::Rgba),
            _ => Err(()),
        }
    }
}

/// A change applied to a color before rendering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Modification {
    /// Move each channel towards white by a fraction
    Lighten(f64),
    /// Move each channel towards black by a fraction
    Darken(f64),
    /// Replace alpha
    Alpha(f64),
    /// Invert each channel
    Invert,
}

impl Modification {
    /// Apply to a color.
    pub fn apply(self, color: Rgba) -> Rgba {
        match self {
            Modification::Lighten(f) => color.map_rgb(|c| c + (1.0 - c) * f),
            Modification::Darken(f) => color.map_rgb(|c| c * (1.0 - f)),
            Modification::Alpha(a) => Rgba {
                a: a.clamp(0.0, 1.0),
                ..color
            },
            Modification::Invert => color.map_rgb(|c| 1.0 - c),
        }
    }
}

impl FromStr for Modification {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "invert" {
            return Ok(Modification::Invert);
        }
        let (name, amount) = s.split_once('=').ok_or(())?;
        let amount: f64 = amount.parse().map_err(|_| ())?;
        match name {
            "lighten" => Ok(Modification::Lighten(amount)),
            "darken" => Ok(Modification::Darken(amount)),
            "alpha" => Ok(Modification::Alpha(amount)),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Modification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Modification::Lighten(v) => write!(f, "lighten={}", v),
            Modification::Darken(v) => write!(f, "darken={}", v),
            Modification::Alpha(v) => write!(f, "alpha={}", v),
            Modification::Invert => write!(f, "invert"),
        }
    }
}

/// Parses its inner value as a color, applies a modification and renders
/// it in a color space.
pub struct Color {
    value: NodeRef,
    space: ColorSpace,
    modification: Option<Modification>,
    fallback: Fallback,
}

impl Color {
    /// Create a color transform.
    pub fn new(
        value: NodeRef,
        space: ColorSpace,
        modification: Option<Modification>,
        fallback: Fallback,
    ) -> Self {
        Self {
            value,
            space,
            modification,
            fallback,
        }
    }

    fn transform(&self) -> Result<Value, EvalError> {
        let text = self.value.evaluate_string()?;
        let color = Rgba::parse(&text).ok_or(EvalError::InvalidColor { value: text })?;
        let color = match self.modification {
            Some(modification) => modification.apply(color),
            None => color,
        };
        Ok(Value::String(color.render(self.space)))
    }
}

impl Evaluate for Color {
    fn evaluate(&self) -> Result<Value, EvalError> {
        self.transform().or_else(|err| self.fallback.recover(err))
    }

    fn is_fixed(&self) -> bool {
        self.value.is_fixed() && self.fallback.is_fixed()
    }

    fn clone_node(&self, ctx: &mut CloneContext) -> Result<NodeRef, CloneError> {
        Ok(Rc::new(Self::new(
            checked_clone(&self.value, ctx)?,
            self.space,
            self.modification,
            self.fallback.clone_in(ctx)?,
        )))
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Color
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Constant;

    #[test]
    fn test_parse_notations() {
        let white = Rgba::parse("#fff").unwrap();
        assert_eq!(white.render(ColorSpace::Rgb), "255,255,255");
        let red = Rgba::parse("#ff0000").unwrap();
        assert_eq!(red.render(ColorSpace::Rgb), "255,0,0");
        let translucent = Rgba::parse("#00000080").unwrap();
        assert_eq!(translucent.render(ColorSpace::Hex), "#00000080");
        let comps = Rgba::parse("10, 20, 30").unwrap();
        assert_eq!(comps.render(ColorSpace::Hex), "#0a141e");
        let with_alpha = Rgba::parse("10,20,30,0.5").unwrap();
        assert_eq!(with_alpha.render(ColorSpace::Rgba), "10,20,30,0.5");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Rgba::parse("#ggg").is_none());
        assert!(Rgba::parse("#12345").is_none());
        assert!(Rgba::parse("1,2").is_none());
        assert!(Rgba::parse("300,0,0").is_none());
    }

    #[test]
    fn test_modifications() {
        let black = Rgba::parse("#000000").unwrap();
        assert_eq!(
            Modification::Lighten(0.5).apply(black).render(ColorSpace::Rgb),
            "128,128,128"
        );
        assert_eq!(
            Modification::Invert.apply(black).render(ColorSpace::Hex),
            "#ffffff"
        );
        assert_eq!(
            Modification::Alpha(0.25).apply(black).render(ColorSpace::Rgba),
            "0,0,0,0.25"
        );
        let white = Rgba::parse("#ffffff").unwrap();
        assert_eq!(
            Modification::Darken(0.5).apply(white).render(ColorSpace::Rgb),
            "128,128,128"
        );
    }

    #[test]
    fn test_modification_from_str() {
        assert_eq!("invert".parse::<Modification>(), Ok(Modification::Invert));
        assert_eq!(
            "lighten=0.1".parse::<Modification>(),
            Ok(Modification::Lighten(0.1))
        );
        assert!("brighten=1".parse::<Modification>().is_err());
        assert!("lighten".parse::<Modification>().is_err());
    }

    #[test]
    fn test_color_node_invalid_input_annotated() {
        let node = Color::new(
            Constant::shared("blue"),
            ColorSpace::Hex,
            None,
            Fallback::new("theme.fg"),
        );
        let err = node.evaluate().unwrap_err();
        assert!(matches!(err.root_cause(), EvalError::InvalidColor { .. }));
    }

    #[test]
    fn test_color_node_renders() {
        let node = Color::new(
            Constant::shared("#336699"),
            ColorSpace::Rgb,
            None,
            Fallback::default(),
        );
        assert_eq!(node.evaluate_string().unwrap(), "51,102,153");
        assert!(node.is_fixed());
    }
}
