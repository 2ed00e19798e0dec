pub mod ec2;
pub mod ingress;
pub mod spec;
