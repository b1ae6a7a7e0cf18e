mod embryo_packages;
mod farm_moves;
mod protocol_lifecycle;
mod status_resolution;
mod transfer_sessions;
