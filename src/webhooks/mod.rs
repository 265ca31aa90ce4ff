pub mod powens;
