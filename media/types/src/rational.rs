use std::fmt;

/**
    A rational number, used for frame rates and time bases.
*/
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /**
        Returns the value as a float, or 0.0 when the denominator is zero.
    */
    pub fn to_f64(self) -> f64 {
        if self.den == 0 {
            0.0
        } else {
            self.num as f64 / self.den as f64
        }
    }

    /**
        Returns the fraction in lowest terms with a positive denominator.
    */
    pub fn reduced(self) -> Self {
        if self.den == 0 {
            return self;
        }
        let divisor = gcd(self.num.unsigned_abs(), self.den.unsigned_abs()).max(1) as i64;
        let sign = if self.den < 0 { -1 } else { 1 };
        Self {
            num: (sign * self.num as i64 / divisor) as i32,
            den: (sign * self.den as i64 / divisor) as i32,
        }
    }

    pub fn is_zero(self) -> bool {
        self.num == 0 || self.den == 0
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}
