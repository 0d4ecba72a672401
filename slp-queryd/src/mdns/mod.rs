pub mod advertise;
