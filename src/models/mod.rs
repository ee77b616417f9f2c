pub mod enums;
pub mod prescription;

pub use enums::PrescriptionStatus;
pub use prescription::{
    decode_prescription, InvalidPrescription, Prescription, PrescriptionError, PrescriptionId,
    PrescriptionRecord, LOW_STOCK_THRESHOLD,
};
