pub mod spelling;