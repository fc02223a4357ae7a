pub mod allotment;
pub mod principal;
pub mod request;
