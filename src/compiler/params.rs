//! Inline parameter sub-grammars of action lines
//!
//! `{ ... }` carries an RGB table or the `Track` color flag, `[ ... ]`
//! carries stepped values, deltas, acceleration tables and range bounds.
//! A clause only applies when both its opening and closing bracket tokens
//! are present.

/// One RGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Unpack a host custom color stored as 0x00BBGGRR.
    pub fn from_packed(color: u32) -> Self {
        Self {
            r: (color & 0xff) as u8,
            g: ((color >> 8) & 0xff) as u8,
            b: ((color >> 16) & 0xff) as u8,
        }
    }
}

/// Parsed `{ ... }` clause
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColorSpec {
    /// Use the target track's live custom color
    pub track_color: bool,
    /// Off color at index 0, on color at index 1
    pub colors: Vec<Rgb>,
}

impl ColorSpec {
    pub fn is_empty(&self) -> bool {
        !self.track_color && self.colors.is_empty()
    }
}

/// Parsed `[ ... ]` clause
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SteppedSpec {
    pub stepped_values: Vec<f64>,
    /// Fixed relative step, from `(d.d)`
    pub delta_value: Option<f64>,
    /// Per-acceleration-level relative step, from `(a,b,c)` decimals
    pub accelerated_delta_values: Vec<f64>,
    /// Per-acceleration-level tick thresholds, from `(N)` or `(a,b,c)` integers
    pub accelerated_tick_values: Vec<u32>,
    /// Inclusive bounds, min first
    pub range: Option<(f64, f64)>,
}

/// Tokens strictly between `open` and the first `close` after it.
fn bracket_clause<'a>(params: &'a [String], open: &str, close: &str) -> Option<&'a [String]> {
    let start = params.iter().position(|p| p == open)?;
    let len = params[start + 1..].iter().position(|p| p == close)?;
    Some(&params[start + 1..start + 1 + len])
}

/// Signed integer or decimal literal: `-?\d+(\.\d+)?`
fn parse_number(token: &str) -> Option<f64> {
    let unsigned = token.strip_prefix('-').unwrap_or(token);
    let (whole, frac) = match unsigned.split_once('.') {
        Some((w, f)) => (w, Some(f)),
        None => (unsigned, None),
    };
    let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if !digits(whole) || frac.is_some_and(|f| !digits(f)) {
        return None;
    }
    token.parse().ok()
}

fn is_decimal(token: &str) -> bool {
    token.contains('.') && parse_number(token).is_some()
}

fn parse_unsigned_int(token: &str) -> Option<u32> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse().ok()
}

fn normalized_range(a: f64, b: f64) -> (f64, f64) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Parse the `{ ... }` clause of an action's parameters.
pub fn parse_color_spec(params: &[String]) -> ColorSpec {
    let mut spec = ColorSpec::default();
    let Some(clause) = bracket_clause(params, "{", "}") else {
        return spec;
    };

    if clause.iter().any(|t| t == "Track") {
        spec.track_color = true;
        return spec;
    }

    let components: Vec<u8> = clause
        .iter()
        .filter_map(|t| parse_unsigned_int(t))
        .map(|v| v.min(255) as u8)
        .collect();

    if !components.is_empty() && components.len() % 3 == 0 {
        spec.colors = components
            .chunks_exact(3)
            .map(|c| Rgb::new(c[0], c[1], c[2]))
            .collect();
    }
    spec
}

/// Parse the `[ ... ]` clause of an action's parameters.
pub fn parse_stepped_spec(params: &[String]) -> SteppedSpec {
    let mut spec = SteppedSpec::default();
    let Some(clause) = bracket_clause(params, "[", "]") else {
        return spec;
    };

    for token in clause {
        if let Some(inner) = token.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
            let items: Vec<&str> = inner.split(',').map(str::trim).collect();
            if items.len() == 1 {
                if let Some(ticks) = parse_unsigned_int(items[0]) {
                    spec.accelerated_tick_values.push(ticks);
                } else if is_decimal(items[0]) {
                    spec.delta_value = parse_number(items[0]);
                }
            } else if items.iter().all(|i| parse_unsigned_int(i).is_some()) {
                spec.accelerated_tick_values
                    .extend(items.iter().filter_map(|i| parse_unsigned_int(i)));
            } else if items.iter().all(|i| is_decimal(i)) {
                spec.accelerated_delta_values
                    .extend(items.iter().filter_map(|i| parse_number(i)));
            }
        } else if let Some(value) = parse_number(token) {
            spec.stepped_values.push(value);
        } else if let Some((lo, hi)) = token.split_once('>') {
            if let (Some(lo), Some(hi)) = (parse_number(lo), parse_number(hi)) {
                spec.range = Some(normalized_range(lo, hi));
            }
        } else if let Some((lo, hi)) = token.split_once('-') {
            if let (Some(lo), Some(hi)) = (parse_number(lo), parse_number(hi)) {
                spec.range = Some(normalized_range(lo, hi));
            }
        }
    }
    spec
}

/// Parameters outside any `{}` or `[]` clause, excluding the action name.
pub fn plain_params(params: &[String]) -> Vec<&str> {
    let mut out = Vec::new();
    let mut closer: Option<&str> = None;
    for p in params.iter().skip(1) {
        match (closer, p.as_str()) {
            (Some(c), t) if t == c => closer = None,
            (Some(_), _) => {}
            (None, "{") => closer = Some("}"),
            (None, "[") => closer = Some("]"),
            (None, t) => out.push(t),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> Vec<String> {
        crate::compiler::tokenize(s)
    }

    #[test]
    fn test_color_pairs() {
        let spec = parse_color_spec(&p("TrackMute { 0 0 0 255 255 255 }"));
        assert_eq!(spec.colors, vec![Rgb::new(0, 0, 0), Rgb::new(255, 255, 255)]);
        assert!(!spec.track_color);
    }

    #[test]
    fn test_color_clamped_and_grouped() {
        let spec = parse_color_spec(&p("TrackMute { 300 0 0 }"));
        assert_eq!(spec.colors, vec![Rgb::new(255, 0, 0)]);

        let spec = parse_color_spec(&p("TrackMute { 1 2 3 4 }"));
        assert!(spec.colors.is_empty(), "not a multiple of three");
    }

    #[test]
    fn test_color_track_and_unclosed() {
        assert!(parse_color_spec(&p("TrackSelect { Track }")).track_color);
        assert!(parse_color_spec(&p("TrackSelect { 0 0 0 255 0 0")).is_empty());
        assert!(parse_color_spec(&p("TrackSelect")).is_empty());
    }

    #[test]
    fn test_stepped_values() {
        let spec = parse_stepped_spec(&p("FXParam 3 [ 0 0.5 1 ]"));
        assert_eq!(spec.stepped_values, vec![0.0, 0.5, 1.0]);
        assert_eq!(spec.range, None);

        let spec = parse_stepped_spec(&p("TrackPanPercent [ -100 0 100 ]"));
        assert_eq!(spec.stepped_values, vec![-100.0, 0.0, 100.0]);
    }

    #[test]
    fn test_acceleration_and_delta() {
        let spec = parse_stepped_spec(&p("FXParam 0 [ (0.05) (1,2,4,8) ]"));
        assert_eq!(spec.delta_value, Some(0.05));
        assert_eq!(spec.accelerated_tick_values, vec![1, 2, 4, 8]);

        let spec = parse_stepped_spec(&p("FXParam 0 [ (0.01,0.02,0.05) (3) ]"));
        assert_eq!(spec.accelerated_delta_values, vec![0.01, 0.02, 0.05]);
        assert_eq!(spec.accelerated_tick_values, vec![3]);

        let spec = parse_stepped_spec(&p("FXParam 0 [ (1,0.5) ]"));
        assert!(spec.accelerated_delta_values.is_empty());
        assert!(spec.accelerated_tick_values.is_empty());
    }

    #[test]
    fn test_ranges() {
        let spec = parse_stepped_spec(&p("FXParam 0 [ 0.8>0.2 ]"));
        assert_eq!(spec.range, Some((0.2, 0.8)));

        let spec = parse_stepped_spec(&p("TrackVolumeDB [ -60>6 ]"));
        assert_eq!(spec.range, Some((-60.0, 6.0)));

        let spec = parse_stepped_spec(&p("FXParam 0 [ 10-2 ]"));
        assert_eq!(spec.range, Some((2.0, 10.0)));
    }

    #[test]
    fn test_unclosed_stepped_clause_discarded() {
        assert_eq!(parse_stepped_spec(&p("FXParam 0 [ 0 1")), SteppedSpec::default());
    }

    #[test]
    fn test_plain_params() {
        let params = p(r#"FXParam 3 "Gain" [ 0 1 ] { 0 0 0 255 0 0 } 2"#);
        assert_eq!(plain_params(&params), vec!["3", "Gain", "2"]);
    }

    #[test]
    fn test_packed_color() {
        assert_eq!(Rgb::from_packed(0x00_30_20_10), Rgb::new(0x10, 0x20, 0x30));
    }
}
