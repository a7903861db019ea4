/// A value with an identity element and an associative, commutative merge
///
/// `merge(identity(), x) == x` and `merge(a, b) == merge(b, a)` must hold for
/// every implementation; the dispatcher relies on it to fold partial results
/// in whatever order tasks complete.
pub trait Accumulate: Sized {
    /// The neutral element of `merge`
    fn identity() -> Self;

    /// Merge `other` into `self` in place
    fn merge_assign(&mut self, other: Self);

    fn merge(mut self, other: Self) -> Self {
        self.merge_assign(other);
        self
    }
}

macro_rules! impl_accumulate_for_numbers {
    ($($t:ty => $zero:expr),* $(,)?) => {
        $(
            impl Accumulate for $t {
                fn identity() -> Self {
                    $zero
                }

                fn merge_assign(&mut self, other: Self) {
                    *self += other;
                }
            }
        )*
    };
}

impl_accumulate_for_numbers!(
    i8 => 0, i16 => 0, i32 => 0, i64 => 0, i128 => 0, isize => 0,
    u8 => 0, u16 => 0, u32 => 0, u64 => 0, u128 => 0, usize => 0,
    f32 => 0.0, f64 => 0.0,
);

/// Elementwise sum; the shorter side is extended with identity elements
impl<T: Accumulate> Accumulate for Vec<T> {
    fn identity() -> Self {
        Vec::new()
    }

    fn merge_assign(&mut self, other: Self) {
        if other.len() > self.len() {
            self.resize_with(other.len(), T::identity);
        }
        for (mine, theirs) in self.iter_mut().zip(other) {
            mine.merge_assign(theirs);
        }
    }
}

impl<T: Accumulate, const N: usize> Accumulate for [T; N] {
    fn identity() -> Self {
        std::array::from_fn(|_| T::identity())
    }

    fn merge_assign(&mut self, other: Self) {
        for (mine, theirs) in self.iter_mut().zip(other) {
            mine.merge_assign(theirs);
        }
    }
}

impl<A: Accumulate, B: Accumulate> Accumulate for (A, B) {
    fn identity() -> Self {
        (A::identity(), B::identity())
    }

    fn merge_assign(&mut self, other: Self) {
        self.0.merge_assign(other.0);
        self.1.merge_assign(other.1);
    }
}
