pub mod descriptive;
pub mod normality;
pub mod two_sample;
pub mod variance;
