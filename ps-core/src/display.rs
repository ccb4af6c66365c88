//! Display sink and value formatting
//!
//! Frontend-agnostic formatting helpers plus the sink trait the report
//! builders render through. Any display (character LCD, graphic LCD, plain
//! text) implements the three-operation sink; the value formatter handles
//! the instrument's 4-significant-digit rounding and SI prefix selection
//! from pico to mega using the same digit-scaling logic as the comparison
//! arithmetic.

use crate::hw::probe::ProbeId;
use crate::scale::{round_to_display, ScaledValue};

/// Base unit of a displayed quantity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Ohm,
    Farad,
    Volt,
}

impl Unit {
    pub fn symbol(self) -> &'static str {
        match self {
            Unit::Ohm => "Ω",
            Unit::Farad => "F",
            Unit::Volt => "V",
        }
    }
}

/// Output device consumed by the report builders.
///
/// Rendering is presentation only; everything the sink receives has already
/// been decided by the classifier.
pub trait DisplaySink {
    /// Render a value with automatic SI prefix and unit
    fn show_value(&mut self, value: ScaledValue, unit: Unit);

    /// Render a probe number
    fn show_pin(&mut self, probe: ProbeId);

    /// Render literal text; '\n' starts a new display line
    fn show_text(&mut self, text: &str);
}

/// Format a value with at most four significant digits and an SI prefix.
///
/// Values of 10000 or more are repeatedly divided by ten with +5
/// pre-rounding (bumping the exponent) until under 10000, then the prefix
/// is chosen so one to three digits remain before the decimal point.
pub fn format_value(value: ScaledValue, unit: Unit) -> String {
    let v = round_to_display(value);
    if v.magnitude == 0 {
        return format!("0{}", unit.symbol());
    }

    let digits = v.magnitude.to_string();
    let len = digits.len() as i32 + v.exponent as i32;

    let mut prefix_exp = 3 * (len - 1).div_euclid(3);
    prefix_exp = prefix_exp.clamp(-12, 6);
    let int_digits = len - prefix_exp;

    let body = if int_digits >= digits.len() as i32 {
        // Pad out to an integer in the prefixed unit
        let zeros = int_digits as usize - digits.len();
        format!("{}{}", digits, "0".repeat(zeros))
    } else if int_digits >= 1 {
        let (int_part, frac_part) = digits.split_at(int_digits as usize);
        format!("{int_part}.{frac_part}")
    } else {
        // Below one in the smallest prefix
        let zeros = (-int_digits) as usize;
        format!("0.{}{}", "0".repeat(zeros), digits)
    };

    format!("{}{}{}", body, si_prefix(prefix_exp), unit.symbol())
}

fn si_prefix(exp: i32) -> &'static str {
    match exp {
        -12 => "p",
        -9 => "n",
        -6 => "µ",
        -3 => "m",
        0 => "",
        3 => "k",
        6 => "M",
        _ => "?",
    }
}

/// Plain-text sink collecting display lines; the bench CLI prints its
/// contents, tests assert on them.
#[derive(Debug, Default)]
pub struct TextDisplay {
    lines: Vec<String>,
    current: String,
}

impl TextDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    /// All completed lines plus the line in progress
    pub fn rendered(&self) -> String {
        let mut out = self.lines.join("\n");
        if !self.current.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&self.current);
        }
        out
    }
}

impl DisplaySink for TextDisplay {
    fn show_value(&mut self, value: ScaledValue, unit: Unit) {
        self.current.push_str(&format_value(value, unit));
    }

    fn show_pin(&mut self, probe: ProbeId) {
        self.current.push_str(&probe.number().to_string());
    }

    fn show_text(&mut self, text: &str) {
        for (i, part) in text.split('\n').enumerate() {
            if i > 0 {
                self.lines.push(std::mem::take(&mut self.current));
            }
            self.current.push_str(part);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_plain_ohms() {
        assert_eq!(format_value(ScaledValue::new(680, 0), Unit::Ohm), "680Ω");
        assert_eq!(format_value(ScaledValue::new(15, 0), Unit::Ohm), "15Ω");
    }

    #[test]
    fn test_format_kilo_mega() {
        assert_eq!(format_value(ScaledValue::new(4700, 0), Unit::Ohm), "4.700kΩ");
        assert_eq!(format_value(ScaledValue::new(470_000, 0), Unit::Ohm), "470.0kΩ");
        assert_eq!(format_value(ScaledValue::new(2_200_000, 0), Unit::Ohm), "2.200MΩ");
    }

    #[test]
    fn test_format_small_resistance() {
        // 5.03 Ω carried in 0.01 Ω units
        assert_eq!(format_value(ScaledValue::new(503, -2), Unit::Ohm), "5.03Ω");
        assert_eq!(format_value(ScaledValue::new(7, -2), Unit::Ohm), "70mΩ");
    }

    #[test]
    fn test_format_capacitance() {
        assert_eq!(format_value(ScaledValue::new(100, -12), Unit::Farad), "100pF");
        assert_eq!(format_value(ScaledValue::new(4700, -12), Unit::Farad), "4.700nF");
        assert_eq!(format_value(ScaledValue::new(10, -6), Unit::Farad), "10µF");
    }

    #[test]
    fn test_format_rounds_to_four_digits() {
        assert_eq!(format_value(ScaledValue::new(123_456, 0), Unit::Ohm), "123.5kΩ");
    }

    #[test]
    fn test_format_millivolts() {
        assert_eq!(format_value(ScaledValue::new(650, -3), Unit::Volt), "650mV");
    }

    #[test]
    fn test_text_display_lines() {
        let mut d = TextDisplay::new();
        d.show_text("Resistor\n");
        d.show_pin(ProbeId::from_index(0));
        d.show_text("-");
        d.show_pin(ProbeId::from_index(1));
        d.show_text(" ");
        d.show_value(ScaledValue::new(4700, 0), Unit::Ohm);
        assert_eq!(d.rendered(), "Resistor\n1-2 4.700kΩ");
    }
}
