mod common;
mod decision;
mod tracker;
