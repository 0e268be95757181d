use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};
use std::ops::{Add, Div, Mul, Neg, Rem, Sub};

/// Largest integer magnitude an `f64` represents exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Digits kept after the decimal point when rendering fractions.
const DISPLAY_PRECISION: usize = 6;

/// The single numeric type of the language, an IEEE 754 double.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Number(f64);

impl Number {
    pub fn new(value: f64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    /// Truncates toward zero.
    pub fn to_int(self) -> i64 {
        self.0 as i64
    }

    pub fn is_int(&self) -> bool {
        self.0.is_finite() && self.0.fract() == 0.0
    }

    /// An integer small enough to survive a trip through `i64` and JSON.
    pub fn is_safe_int(&self) -> bool {
        self.is_int() && self.0.abs() <= MAX_SAFE_INTEGER
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0.0
    }

    pub fn is_nan(&self) -> bool {
        self.0.is_nan()
    }

    pub fn abs(self) -> Self {
        Self(self.0.abs())
    }

    pub fn floor(self) -> Self {
        Self(self.0.floor())
    }

    pub fn ceil(self) -> Self {
        Self(self.0.ceil())
    }

    pub fn sqrt(self) -> Self {
        Self(self.0.sqrt())
    }
}

macro_rules! impl_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Number {
                fn from(value: $ty) -> Self {
                    Self(value as f64)
                }
            }
        )*
    };
}

impl_from!(i32, i64, u32, usize, f64);

macro_rules! impl_binary_op {
    ($trait:ident, $method:ident, $op:tt) => {
        impl $trait for Number {
            type Output = Number;

            fn $method(self, rhs: Number) -> Number {
                Number(self.0 $op rhs.0)
            }
        }
    };
}

impl_binary_op!(Add, add, +);
impl_binary_op!(Sub, sub, -);
impl_binary_op!(Mul, mul, *);
impl_binary_op!(Div, div, /);
impl_binary_op!(Rem, rem, %);

impl Neg for Number {
    type Output = Number;

    fn neg(self) -> Number {
        Number(-self.0)
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.0.partial_cmp(&other.0)
    }
}

impl Display for Number {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.is_safe_int() {
            return write!(f, "{}", self.to_int());
        }
        if !self.0.is_finite() {
            return write!(f, "{}", self.0);
        }

        let fixed = format!("{:.*}", DISPLAY_PRECISION, self.0);
        f.write_str(fixed.trim_end_matches('0').trim_end_matches('.'))
    }
}
