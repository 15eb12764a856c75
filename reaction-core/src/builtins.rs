//! Built-in environment.
//!
//! A fixed, read-only table of names every formula can reference without
//! declaring them: the `Math` namespace and the `Date` constructor. Built-ins
//! are resolved when bindings are gathered for an evaluation and never enter
//! the property store or the dependency graph.
//!
//! Dates are computed in UTC so results do not depend on the host timezone.

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};

use crate::error::EvalError;
use crate::value::{Function, Value};

/// Names that resolve to built-ins.
pub const BUILTIN_NAMES: &[&str] = &["Math", "Date"];

const MS_PER_DAY: f64 = 86_400_000.0;
const MAX_TIME: f64 = 8.64e15;

/// A built-in namespace or constructor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Math,
    Date,
}

/// A native function reachable through a built-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeFn {
    Math(MathFn),
    DateNow,
    DateUtc,
}

impl NativeFn {
    pub fn name(self) -> &'static str {
        match self {
            Self::Math(f) => f.name(),
            Self::DateNow => "now",
            Self::DateUtc => "UTC",
        }
    }
}

/// Check whether `name` is a built-in.
pub fn is_builtin(name: &str) -> bool {
    BUILTIN_NAMES.contains(&name)
}

/// Resolve a built-in by name.
pub fn lookup(name: &str) -> Option<Value> {
    match name {
        "Math" => Some(Value::Builtin(Builtin::Math)),
        "Date" => Some(Value::Builtin(Builtin::Date)),
        _ => None,
    }
}

/// Property access on a built-in, e.g. `Math.PI` or `Math.max`.
pub fn member(builtin: Builtin, name: &str) -> Value {
    match builtin {
        Builtin::Math => match name {
            "PI" => Value::Number(std::f64::consts::PI),
            "E" => Value::Number(std::f64::consts::E),
            "LN2" => Value::Number(std::f64::consts::LN_2),
            "LN10" => Value::Number(std::f64::consts::LN_10),
            "LOG2E" => Value::Number(std::f64::consts::LOG2_E),
            "LOG10E" => Value::Number(std::f64::consts::LOG10_E),
            "SQRT2" => Value::Number(std::f64::consts::SQRT_2),
            "SQRT1_2" => Value::Number(std::f64::consts::FRAC_1_SQRT_2),
            _ => MathFn::from_name(name)
                .map(|f| Value::Function(Function::Native(NativeFn::Math(f))))
                .unwrap_or(Value::Undefined),
        },
        Builtin::Date => match name {
            "now" => Value::Function(Function::Native(NativeFn::DateNow)),
            "UTC" => Value::Function(Function::Native(NativeFn::DateUtc)),
            _ => Value::Undefined,
        },
    }
}

/// Invoke a native function.
pub fn call_native(function: NativeFn, args: &[Value]) -> Result<Value, EvalError> {
    let value = match function {
        NativeFn::Math(f) => Value::Number(f.apply(args)),
        NativeFn::DateNow => Value::Number(now()),
        NativeFn::DateUtc => {
            let fields: Vec<f64> = args.iter().map(Value::to_number).collect();
            Value::Number(time_from_fields(&fields))
        }
    };
    Ok(value)
}

/// `new <builtin>(args)`.
pub fn construct(builtin: Builtin, args: &[Value]) -> Result<Value, EvalError> {
    match builtin {
        Builtin::Math => Err(EvalError::type_error("Math is not a constructor")),
        Builtin::Date => Ok(Value::Date(construct_date(args))),
    }
}

/// `Date(...)` called without `new` yields the current time as text.
pub fn call_date_function() -> Value {
    Value::String(format_date(now()))
}

macro_rules! math_functions {
    ($($variant:ident => $name:literal),* $(,)?) => {
        /// Functions of the `Math` namespace.
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum MathFn {
            $($variant),*
        }

        impl MathFn {
            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($name => Some(Self::$variant),)*
                    _ => None,
                }
            }

            pub fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => $name),*
                }
            }
        }
    };
}

math_functions! {
    Abs => "abs",
    Ceil => "ceil",
    Floor => "floor",
    Round => "round",
    Trunc => "trunc",
    Sign => "sign",
    Sqrt => "sqrt",
    Cbrt => "cbrt",
    Pow => "pow",
    Exp => "exp",
    Log => "log",
    Log10 => "log10",
    Log2 => "log2",
    Sin => "sin",
    Cos => "cos",
    Tan => "tan",
    Asin => "asin",
    Acos => "acos",
    Atan => "atan",
    Atan2 => "atan2",
    Min => "min",
    Max => "max",
    Hypot => "hypot",
}

impl MathFn {
    fn apply(self, args: &[Value]) -> f64 {
        let arg = |i: usize| args.get(i).map_or(f64::NAN, Value::to_number);
        let all = || args.iter().map(Value::to_number);
        match self {
            Self::Abs => arg(0).abs(),
            Self::Ceil => arg(0).ceil(),
            Self::Floor => arg(0).floor(),
            Self::Round => round_half_up(arg(0)),
            Self::Trunc => arg(0).trunc(),
            Self::Sign => {
                let x = arg(0);
                if x.is_nan() || x == 0.0 {
                    x
                } else {
                    x.signum()
                }
            }
            Self::Sqrt => arg(0).sqrt(),
            Self::Cbrt => arg(0).cbrt(),
            Self::Pow => {
                let (base, exp) = (arg(0), arg(1));
                if exp.is_nan() || (base.abs() == 1.0 && exp.is_infinite()) {
                    f64::NAN
                } else {
                    base.powf(exp)
                }
            }
            Self::Exp => arg(0).exp(),
            Self::Log => arg(0).ln(),
            Self::Log10 => arg(0).log10(),
            Self::Log2 => arg(0).log2(),
            Self::Sin => arg(0).sin(),
            Self::Cos => arg(0).cos(),
            Self::Tan => arg(0).tan(),
            Self::Asin => arg(0).asin(),
            Self::Acos => arg(0).acos(),
            Self::Atan => arg(0).atan(),
            Self::Atan2 => arg(0).atan2(arg(1)),
            Self::Min => all().fold(f64::INFINITY, |acc, x| {
                if acc.is_nan() || x.is_nan() {
                    f64::NAN
                } else {
                    acc.min(x)
                }
            }),
            Self::Max => all().fold(f64::NEG_INFINITY, |acc, x| {
                if acc.is_nan() || x.is_nan() {
                    f64::NAN
                } else {
                    acc.max(x)
                }
            }),
            Self::Hypot => all().map(|x| x * x).sum::<f64>().sqrt(),
        }
    }
}

fn round_half_up(x: f64) -> f64 {
    if !x.is_finite() || x.fract() == 0.0 {
        return x;
    }
    (x + 0.5).floor()
}

// ----------------------------------------------------------------------------
// Dates
// ----------------------------------------------------------------------------

fn now() -> f64 {
    Utc::now().timestamp_millis() as f64
}

fn construct_date(args: &[Value]) -> f64 {
    match args {
        [] => now(),
        [Value::Date(t)] => *t,
        [Value::String(text)] => parse_date(text),
        [single] => time_clip(single.to_number()),
        _ => {
            let fields: Vec<f64> = args.iter().map(Value::to_number).collect();
            time_from_fields(&fields)
        }
    }
}

/// Compose a time value from `year, month[, day, hours, minutes, seconds, ms]`.
///
/// Years 0..=99 map to 1900..=1999 and out-of-range months roll over into
/// neighbouring years.
pub fn time_from_fields(fields: &[f64]) -> f64 {
    let field = |i: usize, default: f64| fields.get(i).copied().unwrap_or(default);
    let mut year = field(0, f64::NAN);
    if year.is_finite() {
        let whole = year.trunc();
        if (0.0..=99.0).contains(&whole) {
            year = 1900.0 + whole;
        }
    }
    let day = make_day(year, field(1, 0.0), field(2, 1.0));
    let time = field(3, 0.0) * 3_600_000.0 + field(4, 0.0) * 60_000.0 + field(5, 0.0) * 1000.0 + field(6, 0.0);
    time_clip(day * MS_PER_DAY + time)
}

fn make_day(year: f64, month: f64, date: f64) -> f64 {
    if !(year.is_finite() && month.is_finite() && date.is_finite()) {
        return f64::NAN;
    }
    let (year, month, date) = (year.trunc(), month.trunc(), date.trunc());
    let year = year + (month / 12.0).floor();
    let month = month.rem_euclid(12.0);
    if year.abs() > 400_000.0 {
        return f64::NAN;
    }
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1);
    let first = NaiveDate::from_ymd_opt(year as i32, month as u32 + 1, 1);
    match (epoch, first) {
        (Some(epoch), Some(first)) => first.signed_duration_since(epoch).num_days() as f64 + date - 1.0,
        _ => f64::NAN,
    }
}

fn time_clip(t: f64) -> f64 {
    if !t.is_finite() || t.abs() > MAX_TIME {
        return f64::NAN;
    }
    t.trunc() + 0.0
}

fn parse_date(text: &str) -> f64 {
    let text = text.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return parsed.timestamp_millis() as f64;
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return time_from_fields(&[
            f64::from(date.year()),
            f64::from(date.month0()),
            f64::from(date.day()),
        ]);
    }
    f64::NAN
}

fn to_datetime(t: f64) -> Option<DateTime<Utc>> {
    if t.is_nan() {
        return None;
    }
    DateTime::<Utc>::from_timestamp_millis(t as i64)
}

/// Human-readable form of a time value.
pub fn format_date(t: f64) -> String {
    match to_datetime(t) {
        Some(dt) => dt.format("%a %b %d %Y %H:%M:%S GMT+0000").to_string(),
        None => "Invalid Date".to_string(),
    }
}

/// Call a method on a date value.
pub fn date_method(t: f64, name: &str) -> Result<Value, EvalError> {
    if matches!(name, "getTime" | "valueOf") {
        return Ok(Value::Number(t));
    }
    let Some(dt) = to_datetime(t) else {
        return match name {
            "toISOString" => Err(EvalError::type_error("Invalid time value")),
            "toString" => Ok(Value::String(format_date(t))),
            _ if is_date_getter(name) => Ok(Value::Number(f64::NAN)),
            _ => Err(EvalError::type_error(format!("date.{} is not a function", name))),
        };
    };
    let value = match name {
        "getFullYear" => Value::from(dt.year()),
        "getMonth" => Value::from(dt.month0()),
        "getDate" => Value::from(dt.day()),
        "getDay" => Value::from(dt.weekday().num_days_from_sunday()),
        "getHours" => Value::from(dt.hour()),
        "getMinutes" => Value::from(dt.minute()),
        "getSeconds" => Value::from(dt.second()),
        "getMilliseconds" => Value::from(dt.timestamp_subsec_millis()),
        "toISOString" => Value::String(dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()),
        "toString" => Value::String(format_date(t)),
        _ => return Err(EvalError::type_error(format!("date.{} is not a function", name))),
    };
    Ok(value)
}

fn is_date_getter(name: &str) -> bool {
    matches!(
        name,
        "getFullYear" | "getMonth" | "getDate" | "getDay" | "getHours" | "getMinutes" | "getSeconds" | "getMilliseconds"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn math(name: &str, args: &[f64]) -> f64 {
        let args: Vec<Value> = args.iter().copied().map(Value::from).collect();
        let function = MathFn::from_name(name).unwrap();
        call_native(NativeFn::Math(function), &args)
            .unwrap()
            .as_number()
            .unwrap()
    }

    #[test]
    fn builtin_names_resolve() {
        assert!(is_builtin("Math"));
        assert!(is_builtin("Date"));
        assert!(!is_builtin("hp"));
        assert_eq!(lookup("Math"), Some(Value::Builtin(Builtin::Math)));
        assert_eq!(lookup("con"), None);
    }

    #[test]
    fn math_min_max_are_variadic() {
        assert_eq!(math("max", &[10.0, 12.0, 3.0]), 12.0);
        assert_eq!(math("min", &[10.0, 12.0, 3.0]), 3.0);
        assert_eq!(math("max", &[]), f64::NEG_INFINITY);
        assert!(math("max", &[1.0, f64::NAN]).is_nan());
    }

    #[test]
    fn math_round_goes_half_up() {
        assert_eq!(math("round", &[2.5]), 3.0);
        assert_eq!(math("round", &[-2.5]), -2.0);
        assert_eq!(math("round", &[2.4]), 2.0);
    }

    #[test]
    fn unknown_math_member_is_undefined() {
        assert_eq!(member(Builtin::Math, "nope"), Value::Undefined);
        assert_eq!(member(Builtin::Math, "PI"), Value::Number(std::f64::consts::PI));
    }

    #[test]
    fn two_digit_years_map_to_last_century() {
        let expected = Utc.with_ymd_and_hms(1912, 1, 5, 0, 0, 0).unwrap().timestamp_millis() as f64;
        assert_eq!(time_from_fields(&[12.0, 0.0, 5.0]), expected);
    }

    #[test]
    fn months_roll_over() {
        let expected = Utc.with_ymd_and_hms(2021, 2, 1, 0, 0, 0).unwrap().timestamp_millis() as f64;
        assert_eq!(time_from_fields(&[2020.0, 13.0, 1.0]), expected);
        let expected = Utc.with_ymd_and_hms(2019, 12, 31, 0, 0, 0).unwrap().timestamp_millis() as f64;
        assert_eq!(time_from_fields(&[2020.0, 0.0, 0.0]), expected);
    }

    #[test]
    fn date_getters() {
        let t = time_from_fields(&[2024.0, 1.0, 29.0, 13.0, 5.0]);
        assert_eq!(date_method(t, "getFullYear").unwrap(), Value::from(2024));
        assert_eq!(date_method(t, "getMonth").unwrap(), Value::from(1));
        assert_eq!(date_method(t, "getDate").unwrap(), Value::from(29));
        assert_eq!(date_method(t, "getHours").unwrap(), Value::from(13));
        assert_eq!(
            date_method(t, "toISOString").unwrap(),
            Value::from("2024-02-29T13:05:00.000Z")
        );
    }

    #[test]
    fn invalid_dates() {
        assert!(construct_date(&[Value::from("not a date")]).is_nan());
        assert_eq!(format_date(f64::NAN), "Invalid Date");
        assert!(date_method(f64::NAN, "toISOString").is_err());
    }
}
