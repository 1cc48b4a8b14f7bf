mod assembler;
mod dof;
mod projection;
