pub mod attempt;
pub mod question;
