mod migrations;
mod preferences;
