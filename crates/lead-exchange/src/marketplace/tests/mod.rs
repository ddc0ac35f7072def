mod claims;
mod common;
mod leads;
