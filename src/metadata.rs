use serde::{Deserialize, Serialize};

use crate::{ImageOwned, NoiseEstimate};

/// Key of the processing history lines.
pub const HISTORY_KEY: &str = "HISTORY";
/// Key prefix of the per-channel noise estimates (`NOISE00`, `NOISE01`, ...).
pub const NOISE_KEY: &str = "NOISE";
/// Key prefix of the per-channel noise pixel fractions (`NOISEF00`, ...).
pub const NOISE_FRACTION_KEY: &str = "NOISEF";
/// Key prefix of the per-channel noise evaluation algorithms (`NOISEA00`, ...).
pub const NOISE_ALGORITHM_KEY: &str = "NOISEA";

/// A metadata item.
///
/// This struct holds a metadata item, which is a key-value pair with an optional comment.
///
/// # Valid Types
/// The valid types for the metadata value are:
/// - [`u8`] | [`u16`] | [`u32`] | [`u64`]
/// - [`i32`] | [`i64`]
/// - [`f32`] | [`f64`]
/// - [`String`] | [`&str`]
///
/// # Note
/// The metadata key is case-insensitive and is stored as an uppercase string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericLineItem {
    pub(crate) name: String,
    pub(crate) value: GenericValue,
    pub(crate) comment: Option<String>,
}

/// A type-erased enum to hold a metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum GenericValue {
    /// An unsigned 8-bit integer.
    U8(u8),
    /// An unsigned 16-bit integer.
    U16(u16),
    /// An unsigned 32-bit integer.
    U32(u32),
    /// An unsigned 64-bit integer.
    U64(u64),
    /// A signed 32-bit integer.
    I32(i32),
    /// A signed 64-bit integer.
    I64(i64),
    /// A 32-bit floating point number.
    F32(f32),
    /// A 64-bit floating point number.
    F64(f64),
    /// A string.
    String(String),
}

/// A demosaiced image with the identifiers of the pattern and method that produced
/// it, the optional noise estimates, and keyword metadata.
///
/// # Usage
/// ```
/// use cfadebayer::{run_debayer, BayerPattern, CfaPattern, ColorSpace, DebayerParameters, ImageOwned};
///
/// let mosaic = ImageOwned::from_owned(vec![0.5f32; 16 * 16], 16, 16, ColorSpace::Gray).unwrap();
/// let params = DebayerParameters { evaluate_noise: false, ..Default::default() };
/// let mut out = run_debayer(&mosaic, &CfaPattern::Bayer(BayerPattern::Rggb), &params, None).unwrap();
/// assert_eq!(out.pattern_id(), "RGGB");
/// out.insert_key("OBSERVER", "nobody").unwrap();
/// assert!(out.get_key("observer").is_some());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebayerOutput {
    metadata: Vec<GenericLineItem>,
    image: ImageOwned<f32>,
    pattern_id: String,
    method_id: String,
    noise: Option<[NoiseEstimate; 3]>,
}

impl DebayerOutput {
    pub(crate) fn new(image: ImageOwned<f32>, pattern_id: String, method_id: String) -> Self {
        let metadata = vec![
            GenericLineItem::history(format!("Debayer.pattern: {pattern_id}")),
            GenericLineItem::history(format!("Debayer.method: {method_id}")),
        ];
        DebayerOutput {
            metadata,
            image,
            pattern_id,
            method_id,
            noise: None,
        }
    }

    /// The demosaiced image.
    pub fn image(&self) -> &ImageOwned<f32> {
        &self.image
    }

    /// Consume the output, keeping the image.
    pub fn into_image(self) -> ImageOwned<f32> {
        self.image
    }

    /// Identifier of the CFA pattern, e.g. `RGGB` or the 36 letters of an X-Trans tile.
    pub fn pattern_id(&self) -> &str {
        &self.pattern_id
    }

    /// Identifier of the demosaicing method, e.g. `VNG` or `Markesteijn-1`.
    pub fn method_id(&self) -> &str {
        &self.method_id
    }

    /// Per-channel noise estimates, when noise was evaluated.
    pub fn noise_estimates(&self) -> Option<&[NoiseEstimate; 3]> {
        self.noise.as_ref()
    }

    /// Record per-channel noise estimates, replacing earlier ones.
    ///
    /// Inserts the `NOISEnn`, `NOISEFnn` and `NOISEAnn` keywords and a history line.
    pub fn set_noise(&mut self, noise: [NoiseEstimate; 3]) {
        self.metadata.retain(|x| {
            !(is_noise_key(&x.name)
                || (x.name == HISTORY_KEY
                    && matches!(&x.value, GenericValue::String(s) if s.starts_with("Debayer.noiseEstimates"))))
        });
        self.metadata.push(GenericLineItem::history(format!(
            "Debayer.noiseEstimates: {:.3e} {:.3e} {:.3e}",
            noise[0].sigma, noise[1].sigma, noise[2].sigma
        )));
        for (i, est) in noise.iter().enumerate() {
            self.metadata.push(GenericLineItem {
                name: format!("{NOISE_KEY}{i:02}"),
                value: est.sigma.into(),
                comment: Some(format!("Gaussian noise estimate, channel #{i}")),
            });
            self.metadata.push(GenericLineItem {
                name: format!("{NOISE_FRACTION_KEY}{i:02}"),
                value: est.fraction.into(),
                comment: Some(format!("Fraction of noise pixels, channel #{i}")),
            });
            self.metadata.push(GenericLineItem {
                name: format!("{NOISE_ALGORITHM_KEY}{i:02}"),
                value: est.algorithm.name().to_owned().into(),
                comment: Some(format!("Noise evaluation algorithm, channel #{i}")),
            });
        }
        self.noise = Some(noise);
    }

    /// Get the contained metadata as a slice of [`GenericLineItem`]s.
    pub fn get_metadata(&self) -> &[GenericLineItem] {
        &self.metadata
    }

    /// Get a specific metadata value by name.
    ///
    /// Returns the first metadata value with the given name.
    pub fn get_key(&self, name: &str) -> Option<&GenericLineItem> {
        name_check(name).ok()?;
        let name = name.to_uppercase();
        self.metadata.iter().find(|x| x.name == name)
    }

    /// Insert a metadata value.
    ///
    /// # Arguments
    /// - `name`: The name of the metadata value. The name must be non-empty and at most 80 characters.
    /// - `value`: The value to insert, or a tuple of the value and a comment.
    ///
    /// # Errors
    /// - If the name is empty or too long.
    /// - If a string value or the comment is empty or too long.
    pub fn insert_key<T: InsertValue>(&mut self, name: &str, value: T) -> Result<(), &'static str> {
        name_check(name)?;
        let line = value.into_line(name.to_uppercase())?;
        self.metadata.push(line);
        Ok(())
    }

    /// Remove every metadata value with the given name.
    ///
    /// # Errors
    /// - `Key not found` if there is no such value.
    pub fn remove_key(&mut self, name: &str) -> Result<(), &'static str> {
        name_check(name)?;
        let name = name.to_uppercase();
        let len = self.metadata.len();
        self.metadata.retain(|x| x.name != name);
        if self.metadata.len() == len {
            Err("Key not found")
        } else {
            Ok(())
        }
    }
}

fn is_noise_key(name: &str) -> bool {
    [NOISE_FRACTION_KEY, NOISE_ALGORITHM_KEY, NOISE_KEY]
        .iter()
        .filter_map(|prefix| name.strip_prefix(prefix))
        .any(|idx| idx.len() == 2 && idx.bytes().all(|b| b.is_ascii_digit()))
}

impl GenericLineItem {
    fn history(text: String) -> Self {
        GenericLineItem {
            name: HISTORY_KEY.to_owned(),
            value: text.into(),
            comment: None,
        }
    }

    /// Get the name of the metadata value.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the comment of the metadata value.
    pub fn get_comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    /// Get the value of the metadata item.
    pub fn get_value(&self) -> &GenericValue {
        &self.value
    }
}

macro_rules! impl_from_genericvalue {
    ($t:ty, $variant:path) => {
        impl From<$t> for GenericValue {
            fn from(value: $t) -> Self {
                $variant(value)
            }
        }

        impl TryFrom<GenericValue> for $t {
            type Error = String;

            fn try_from(value: GenericValue) -> Result<$t, Self::Error> {
                match value {
                    $variant(x) => Ok(x),
                    _ => Err(format!("Invalid type {:?}", value)),
                }
            }
        }

        impl InsertValue for $t {
            fn into_line(self, name: String) -> Result<GenericLineItem, &'static str> {
                Ok(GenericLineItem {
                    name,
                    value: self.into(),
                    comment: None,
                })
            }
        }

        impl InsertValue for ($t, &str) {
            fn into_line(self, name: String) -> Result<GenericLineItem, &'static str> {
                comment_check(self.1)?;
                Ok(GenericLineItem {
                    name,
                    value: self.0.into(),
                    comment: Some(self.1.to_owned()),
                })
            }
        }
    };
}

impl_from_genericvalue!(u8, GenericValue::U8);
impl_from_genericvalue!(u16, GenericValue::U16);
impl_from_genericvalue!(u32, GenericValue::U32);
impl_from_genericvalue!(u64, GenericValue::U64);
impl_from_genericvalue!(i32, GenericValue::I32);
impl_from_genericvalue!(i64, GenericValue::I64);
impl_from_genericvalue!(f32, GenericValue::F32);
impl_from_genericvalue!(f64, GenericValue::F64);
impl_from_genericvalue!(String, GenericValue::String);

/// A value that can be stored as a [`GenericLineItem`].
pub trait InsertValue {
    /// Build the metadata item named `name`.
    fn into_line(self, name: String) -> Result<GenericLineItem, &'static str>;
}

impl InsertValue for &str {
    fn into_line(self, name: String) -> Result<GenericLineItem, &'static str> {
        str_value_check(self)?;
        self.to_owned().into_line(name)
    }
}

impl InsertValue for (&str, &str) {
    fn into_line(self, name: String) -> Result<GenericLineItem, &'static str> {
        str_value_check(self.0)?;
        (self.0.to_owned(), self.1).into_line(name)
    }
}

fn name_check(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        Err("Key cannot be empty")
    } else if name.len() > 80 {
        Err("Key cannot be longer than 80 characters")
    } else {
        Ok(())
    }
}

fn comment_check(comment: &str) -> Result<(), &'static str> {
    if comment.is_empty() {
        Err("Comment cannot be empty")
    } else if comment.len() > 4096 {
        Err("Comment cannot be longer than 4096 characters")
    } else {
        Ok(())
    }
}

fn str_value_check(value: &str) -> Result<(), &'static str> {
    if value.is_empty() {
        Err("Value cannot be empty")
    } else if value.len() > 4096 {
        Err("Value cannot be longer than 4096 characters")
    } else {
        Ok(())
    }
}

macro_rules! impl_get_value {
    ($($t:ident),*) => {
        ::paste::paste! {
            impl GenericValue {
                $(
                    #[doc = "Get the [`" $t "`] metadata value."]
                    pub fn [<get_value_ $t>](&self) -> Option<$t> {
                        // scalar clone is a copy
                        <$t>::try_from(self.clone()).ok()
                    }
                )*

                /// Get the string metadata value.
                pub fn get_value_string(&self) -> Option<&str> {
                    match self {
                        GenericValue::String(s) => Some(s),
                        _ => None,
                    }
                }
            }
        }
    };
}

impl_get_value!(u8, u16, u32, u64, i32, i64, f32, f64);
