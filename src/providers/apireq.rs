//! A utility module with helpers shared by the vendor API clients.

mod error;

pub(crate) use error::Error as ReqwestError;
pub(crate) use reqwest::Url;
