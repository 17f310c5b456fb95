//! SQLite database for the thermite pipe table.

thermite_core::define_database!(RelayDatabase, "Pipe database migrations complete");
