use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("header name {name:?} is not ascii")]
    NonAscii { name: String },

    #[error("header value {value:?} is not latin-1")]
    NonLatin1 { value: String },
}

impl EncodeError {
    pub fn non_ascii<S: ToString>(name: S) -> Self {
        Self::NonAscii { name: name.to_string() }
    }

    pub fn non_latin1<S: ToString>(value: S) -> Self {
        Self::NonLatin1 { value: value.to_string() }
    }
}
