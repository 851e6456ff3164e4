//! Typed variables exposed as holding registers

use tracing::debug;

use super::IoDevice;
use crate::register::RegisterKind;

/// Conversion between a native value and one 16-bit register word
///
/// Narrowing rules:
///
/// | type | to word | from word |
/// |---|---|---|
/// | `bool` | `0` / `1` | non-zero is `true` |
/// | `u8` | zero-extended | low byte |
/// | `i8` | sign-extended | low byte reinterpreted |
/// | `u16` | identity | identity |
/// | `i16` | bit reinterpretation | bit reinterpretation |
/// | `u32`, `u64` | low 16 bits | zero-extended |
/// | `i32`, `i64` | low 16 bits | word read as `i16`, sign-extended |
/// | `f32` | truncated toward zero, saturating, NaN is `0` | exact |
pub trait RegisterWord: Copy + Send + 'static {
    fn to_word(self) -> u16;
    fn from_word(word: u16) -> Self;
}

impl RegisterWord for bool {
    fn to_word(self) -> u16 {
        u16::from(self)
    }

    fn from_word(word: u16) -> Self {
        word != 0
    }
}

impl RegisterWord for u8 {
    fn to_word(self) -> u16 {
        u16::from(self)
    }

    fn from_word(word: u16) -> Self {
        word as u8
    }
}

impl RegisterWord for i8 {
    fn to_word(self) -> u16 {
        self as i16 as u16
    }

    fn from_word(word: u16) -> Self {
        word as i8
    }
}

impl RegisterWord for u16 {
    fn to_word(self) -> u16 {
        self
    }

    fn from_word(word: u16) -> Self {
        word
    }
}

impl RegisterWord for i16 {
    fn to_word(self) -> u16 {
        self as u16
    }

    fn from_word(word: u16) -> Self {
        word as i16
    }
}

macro_rules! impl_wide_word {
    ($($unsigned:ty),* ; $($signed:ty),*) => {
        $(
            impl RegisterWord for $unsigned {
                fn to_word(self) -> u16 {
                    self as u16
                }

                fn from_word(word: u16) -> Self {
                    Self::from(word)
                }
            }
        )*
        $(
            impl RegisterWord for $signed {
                fn to_word(self) -> u16 {
                    self as u16
                }

                fn from_word(word: u16) -> Self {
                    Self::from(word as i16)
                }
            }
        )*
    };
}

impl_wide_word!(u32, u64; i32, i64);

impl RegisterWord for f32 {
    fn to_word(self) -> u16 {
        self as u16
    }

    fn from_word(word: u16) -> Self {
        Self::from(word)
    }
}

type Getter = Box<dyn Fn() -> u16 + Send>;
type Setter = Box<dyn FnMut(u16) + Send>;

/// Holding register backed by caller-supplied accessors
///
/// The native type is erased at construction through [`RegisterWord`].
pub struct Variable {
    getter: Getter,
    setter: Option<Setter>,
}

impl std::fmt::Debug for Variable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Variable")
            .field("writable", &self.is_writable())
            .finish_non_exhaustive()
    }
}

impl Variable {
    pub fn read_only<T, G>(getter: G) -> Self
    where
        T: RegisterWord,
        G: Fn() -> T + Send + 'static,
    {
        Self {
            getter: Box::new(move || getter().to_word()),
            setter: None,
        }
    }

    pub fn read_write<T, G, S>(getter: G, mut setter: S) -> Self
    where
        T: RegisterWord,
        G: Fn() -> T + Send + 'static,
        S: FnMut(T) + Send + 'static,
    {
        Self {
            getter: Box::new(move || getter().to_word()),
            setter: Some(Box::new(move |word| setter(T::from_word(word)))),
        }
    }

    pub fn is_writable(&self) -> bool {
        self.setter.is_some()
    }
}

impl IoDevice for Variable {
    fn kind(&self) -> RegisterKind {
        RegisterKind::HoldingRegister
    }

    fn holding(&self) -> u16 {
        (self.getter)()
    }

    fn set_holding(&mut self, value: u16) {
        match self.setter.as_mut() {
            Some(setter) => setter(value),
            None => debug!("Variable write ignored (read-only): {}", value),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_signed_narrowing() {
        assert_eq!((-1i8).to_word(), 0xFFFF);
        assert_eq!((-2i16).to_word(), 0xFFFE);
        assert_eq!(i32::from_word(0xFFFF), -1);
        assert_eq!(i64::from_word(0x7FFF), 32767);
        assert_eq!(0x1_0005u32.to_word(), 5);
        assert_eq!(u64::from_word(0xFFFF), 65535);
        assert_eq!(u8::from_word(0x1234), 0x34);
    }

    #[test]
    fn test_float_and_bool_conversions() {
        assert_eq!(12.9f32.to_word(), 12);
        assert_eq!((-3.0f32).to_word(), 0);
        assert_eq!(f32::NAN.to_word(), 0);
        assert_eq!(1e9f32.to_word(), u16::MAX);
        assert!(bool::from_word(7));
        assert_eq!(true.to_word(), 1);
    }

    #[test]
    fn test_read_write_variable() {
        let cell = Arc::new(AtomicI32::new(-5));
        let reader = cell.clone();
        let writer = cell.clone();
        let mut var = Variable::read_write(
            move || reader.load(Ordering::SeqCst),
            move |v: i32| writer.store(v, Ordering::SeqCst),
        );

        assert_eq!(var.holding(), 0xFFFB);
        var.set_holding(0xFFF0);
        assert_eq!(cell.load(Ordering::SeqCst), -16);
        assert!(var.is_writable());
    }

    #[test]
    fn test_read_only_variable_discards_writes() {
        let mut var = Variable::read_only(|| 42u32);
        var.set_holding(7);
        assert_eq!(var.holding(), 42);
        assert!(!var.is_writable());
        assert_eq!(var.kind(), RegisterKind::HoldingRegister);
    }
}
